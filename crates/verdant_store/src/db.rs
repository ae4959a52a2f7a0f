use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum Families {
    Table,
    #[iden = "familyId"]
    FamilyId,
    #[iden = "familyName"]
    FamilyName,
    #[iden = "familyDescription"]
    FamilyDescription,
    #[iden = "familyCreatedAt"]
    FamilyCreatedAt,
    #[iden = "familyModifiedAt"]
    FamilyModifiedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Generations {
    Table,
    #[iden = "generationId"]
    GenerationId,
    #[iden = "generationName"]
    GenerationName,
    #[iden = "familyId"]
    FamilyId,
    #[iden = "generationCreatedAt"]
    GenerationCreatedAt,
    #[iden = "generationModifiedAt"]
    GenerationModifiedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum GenerationParents {
    Table,
    #[iden = "parentId"]
    ParentId,
    #[iden = "generationId"]
    GenerationId,
    #[iden = "plantId"]
    PlantId,
}

#[derive(Iden, Clone, Copy)]
pub enum Genotypes {
    Table,
    #[iden = "genotypeId"]
    GenotypeId,
    #[iden = "genotypeName"]
    GenotypeName,
    #[iden = "genotypeDescription"]
    GenotypeDescription,
    #[iden = "generationId"]
    GenerationId,
    #[iden = "genotypeCreatedAt"]
    GenotypeCreatedAt,
    #[iden = "genotypeModifiedAt"]
    GenotypeModifiedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Plants {
    Table,
    #[iden = "plantId"]
    PlantId,
    #[iden = "plantName"]
    PlantName,
    #[iden = "plantSex"]
    PlantSex,
    #[iden = "plantClonedFrom"]
    PlantClonedFrom,
    #[iden = "plantDescription"]
    PlantDescription,
    #[iden = "genotypeId"]
    GenotypeId,
    #[iden = "mediumId"]
    MediumId,
    #[iden = "plantCreatedAt"]
    PlantCreatedAt,
    #[iden = "plantModifiedAt"]
    PlantModifiedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Environments {
    Table,
    #[iden = "environmentId"]
    EnvironmentId,
    #[iden = "environmentName"]
    EnvironmentName,
    #[iden = "environmentDescription"]
    EnvironmentDescription,
    #[iden = "environmentCreatedAt"]
    EnvironmentCreatedAt,
    #[iden = "environmentModifiedAt"]
    EnvironmentModifiedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Mediums {
    Table,
    #[iden = "mediumId"]
    MediumId,
    #[iden = "mediumName"]
    MediumName,
    #[iden = "mediumDescription"]
    MediumDescription,
    #[iden = "environmentId"]
    EnvironmentId,
    #[iden = "mediumCreatedAt"]
    MediumCreatedAt,
    #[iden = "mediumModifiedAt"]
    MediumModifiedAt,
}
