use sea_orm_migration::prelude::*;

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Families::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Families::FamilyId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Families::FamilyName).string().not_null())
                    .col(ColumnDef::new(Families::FamilyDescription).text())
                    .col(
                        ColumnDef::new(Families::FamilyCreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Families::FamilyModifiedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Generations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Generations::GenerationId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Generations::GenerationName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Generations::FamilyId).integer().not_null())
                    .col(
                        ColumnDef::new(Generations::GenerationCreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Generations::GenerationModifiedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_generations_family")
                            .from(Generations::Table, Generations::FamilyId)
                            .to(Families::Table, Families::FamilyId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Environments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Environments::EnvironmentId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Environments::EnvironmentName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Environments::EnvironmentDescription).text())
                    .col(
                        ColumnDef::new(Environments::EnvironmentCreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Environments::EnvironmentModifiedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Mediums::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Mediums::MediumId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Mediums::MediumName).string().not_null())
                    .col(ColumnDef::new(Mediums::MediumDescription).text())
                    .col(ColumnDef::new(Mediums::EnvironmentId).integer())
                    .col(
                        ColumnDef::new(Mediums::MediumCreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Mediums::MediumModifiedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_mediums_environment")
                            .from(Mediums::Table, Mediums::EnvironmentId)
                            .to(Environments::Table, Environments::EnvironmentId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Genotypes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Genotypes::GenotypeId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Genotypes::GenotypeName).string())
                    .col(ColumnDef::new(Genotypes::GenotypeDescription).text())
                    .col(ColumnDef::new(Genotypes::GenerationId).integer().not_null())
                    .col(
                        ColumnDef::new(Genotypes::GenotypeCreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Genotypes::GenotypeModifiedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_genotypes_generation")
                            .from(Genotypes::Table, Genotypes::GenerationId)
                            .to(Generations::Table, Generations::GenerationId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Plants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Plants::PlantId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Plants::PlantName).string().not_null())
                    .col(ColumnDef::new(Plants::PlantSex).string())
                    .col(ColumnDef::new(Plants::PlantClonedFrom).integer())
                    .col(ColumnDef::new(Plants::PlantDescription).text())
                    .col(ColumnDef::new(Plants::GenotypeId).integer().not_null())
                    .col(ColumnDef::new(Plants::MediumId).integer())
                    .col(
                        ColumnDef::new(Plants::PlantCreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Plants::PlantModifiedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_plants_genotype")
                            .from(Plants::Table, Plants::GenotypeId)
                            .to(Genotypes::Table, Genotypes::GenotypeId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_plants_medium")
                            .from(Plants::Table, Plants::MediumId)
                            .to(Mediums::Table, Mediums::MediumId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_plants_cloned_from")
                            .from(Plants::Table, Plants::PlantClonedFrom)
                            .to(Plants::Table, Plants::PlantId)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GenerationParents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GenerationParents::ParentId)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GenerationParents::GenerationId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GenerationParents::PlantId)
                            .integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_generation_parents_generation")
                            .from(GenerationParents::Table, GenerationParents::GenerationId)
                            .to(Generations::Table, Generations::GenerationId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_generation_parents_plant")
                            .from(GenerationParents::Table, GenerationParents::PlantId)
                            .to(Plants::Table, Plants::PlantId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_generation_parents_generation")
                    .table(GenerationParents::Table)
                    .col(GenerationParents::GenerationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_generations_family")
                    .table(Generations::Table)
                    .col(Generations::FamilyId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            Table::drop().table(GenerationParents::Table).to_owned(),
            Table::drop().table(Plants::Table).to_owned(),
            Table::drop().table(Genotypes::Table).to_owned(),
            Table::drop().table(Mediums::Table).to_owned(),
            Table::drop().table(Environments::Table).to_owned(),
            Table::drop().table(Generations::Table).to_owned(),
            Table::drop().table(Families::Table).to_owned(),
        ] {
            manager.drop_table(table).await?;
        }
        Ok(())
    }
}
