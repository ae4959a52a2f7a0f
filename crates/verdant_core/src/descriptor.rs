//! Static configuration for every record type the data layer manages.
//!
//! A descriptor is pure data: which table a record type lives in, which
//! attributes it has, what its defaults are, and how it hangs off its
//! parent types. All behavior lives in the store and is parametrized by
//! these values; there is no per-type code.

use crate::Value;

/// A parent link. `nullable` mirrors the foreign-key column on the child
/// table: a nullable link means the whole ancestor chain behind it may be
/// left out of a create request entirely.
#[derive(Clone, Copy, Debug)]
pub struct ParentLink {
    pub descriptor: &'static EntityDescriptor,
    pub nullable: bool,
}

/// A multi-valued relation stored in a join table, filterable as an
/// exact set ("all of exactly these related rows").
#[derive(Debug, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub attribute: &'static str,
    pub table: &'static str,
    pub own_column: &'static str,
    pub other_column: &'static str,
}

/// Result-object attribute listing ids of children created in the same
/// request. Synthesized at result-build time, never stored.
#[derive(Clone, Copy, Debug)]
pub struct ChildIds {
    pub attribute: &'static str,
    pub child_id_attribute: &'static str,
}

#[derive(Clone, Copy, Debug)]
pub enum DefaultValue {
    Text(&'static str),
    Int(i64),
}

impl DefaultValue {
    pub fn to_value(self) -> Value {
        match self {
            DefaultValue::Text(s) => Value::Text(s.to_string()),
            DefaultValue::Int(i) => Value::Int(i),
        }
    }
}

pub struct EntityDescriptor {
    pub name: &'static str,
    pub table: &'static str,
    pub id_attribute: &'static str,
    pub created_at_attribute: &'static str,
    pub modified_at_attribute: &'static str,
    /// Regular attributes, in column order. Skip-listed entries are not
    /// generic columns (the relation attribute lives in a join table).
    pub attributes: &'static [&'static str],
    pub skip_attributes: &'static [&'static str],
    pub required: &'static [&'static str],
    pub defaults: &'static [(&'static str, DefaultValue)],
    pub enums: &'static [(&'static str, &'static [&'static str])],
    /// Attributes that reference another row without forming a parent
    /// chain (e.g. a plant's clone source).
    pub references: &'static [&'static str],
    pub plural_key: &'static str,
    pub parents: &'static [ParentLink],
    pub relation: Option<&'static RelationDescriptor>,
    pub child_ids: Option<ChildIds>,
}

impl EntityDescriptor {
    /// Attributes stored as columns on this record's own table.
    pub fn insert_attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes
            .iter()
            .copied()
            .filter(move |attr| !self.skip_attributes.contains(attr))
    }

    pub fn parent_id_attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.parents
            .iter()
            .map(|link| link.descriptor.id_attribute)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains(&name)
    }

    /// Whether `name` is legal in a filter, sort or projection for this
    /// record type.
    pub fn searchable(&self, name: &str) -> bool {
        name == self.id_attribute
            || name == self.created_at_attribute
            || name == self.modified_at_attribute
            || self.has_attribute(name)
            || self.parent_id_attributes().any(|attr| attr == name)
    }

    pub fn default_for(&self, name: &str) -> Option<Value> {
        self.defaults
            .iter()
            .find(|(attr, _)| *attr == name)
            .map(|(_, default)| default.to_value())
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(&name)
    }

    pub fn enum_values(&self, name: &str) -> Option<&'static [&'static str]> {
        self.enums
            .iter()
            .find(|(attr, _)| *attr == name)
            .map(|(_, values)| *values)
    }

    pub fn is_relation_attribute(&self, name: &str) -> bool {
        self.relation.is_some_and(|relation| relation.attribute == name)
    }
}

impl PartialEq for EntityDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EntityDescriptor {}

impl std::fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .finish()
    }
}

pub static GENERATION_PARENTS: RelationDescriptor = RelationDescriptor {
    attribute: "generationParents",
    table: "generation_parents",
    own_column: "generationId",
    other_column: "plantId",
};

pub static FAMILY: EntityDescriptor = EntityDescriptor {
    name: "family",
    table: "families",
    id_attribute: "familyId",
    created_at_attribute: "familyCreatedAt",
    modified_at_attribute: "familyModifiedAt",
    attributes: &["familyName", "familyDescription"],
    skip_attributes: &[],
    required: &["familyName"],
    defaults: &[("familyDescription", DefaultValue::Text(""))],
    enums: &[],
    references: &[],
    plural_key: "families",
    parents: &[],
    relation: None,
    child_ids: Some(ChildIds {
        attribute: "familyGenerations",
        child_id_attribute: "generationId",
    }),
};

pub static GENERATION: EntityDescriptor = EntityDescriptor {
    name: "generation",
    table: "generations",
    id_attribute: "generationId",
    created_at_attribute: "generationCreatedAt",
    modified_at_attribute: "generationModifiedAt",
    attributes: &["generationName", "generationParents"],
    skip_attributes: &["generationParents"],
    required: &["generationName"],
    defaults: &[],
    enums: &[],
    references: &[],
    plural_key: "generations",
    parents: &[ParentLink {
        descriptor: &FAMILY,
        nullable: false,
    }],
    relation: Some(&GENERATION_PARENTS),
    child_ids: Some(ChildIds {
        attribute: "generationGenotypes",
        child_id_attribute: "genotypeId",
    }),
};

pub static GENOTYPE: EntityDescriptor = EntityDescriptor {
    name: "genotype",
    table: "genotypes",
    id_attribute: "genotypeId",
    created_at_attribute: "genotypeCreatedAt",
    modified_at_attribute: "genotypeModifiedAt",
    attributes: &["genotypeName", "genotypeDescription"],
    skip_attributes: &[],
    required: &[],
    defaults: &[
        ("genotypeName", DefaultValue::Text("")),
        ("genotypeDescription", DefaultValue::Text("")),
    ],
    enums: &[],
    references: &[],
    plural_key: "genotypes",
    parents: &[ParentLink {
        descriptor: &GENERATION,
        nullable: false,
    }],
    relation: None,
    child_ids: Some(ChildIds {
        attribute: "genotypePlants",
        child_id_attribute: "plantId",
    }),
};

pub static ENVIRONMENT: EntityDescriptor = EntityDescriptor {
    name: "environment",
    table: "environments",
    id_attribute: "environmentId",
    created_at_attribute: "environmentCreatedAt",
    modified_at_attribute: "environmentModifiedAt",
    attributes: &["environmentName", "environmentDescription"],
    skip_attributes: &[],
    required: &["environmentName"],
    defaults: &[("environmentDescription", DefaultValue::Text(""))],
    enums: &[],
    references: &[],
    plural_key: "environments",
    parents: &[],
    relation: None,
    child_ids: Some(ChildIds {
        attribute: "environmentMediums",
        child_id_attribute: "mediumId",
    }),
};

pub static MEDIUM: EntityDescriptor = EntityDescriptor {
    name: "medium",
    table: "mediums",
    id_attribute: "mediumId",
    created_at_attribute: "mediumCreatedAt",
    modified_at_attribute: "mediumModifiedAt",
    attributes: &["mediumName", "mediumDescription"],
    skip_attributes: &[],
    required: &["mediumName"],
    defaults: &[("mediumDescription", DefaultValue::Text(""))],
    enums: &[],
    references: &[],
    plural_key: "mediums",
    parents: &[ParentLink {
        descriptor: &ENVIRONMENT,
        nullable: true,
    }],
    relation: None,
    child_ids: Some(ChildIds {
        attribute: "mediumPlants",
        child_id_attribute: "plantId",
    }),
};

pub static PLANT: EntityDescriptor = EntityDescriptor {
    name: "plant",
    table: "plants",
    id_attribute: "plantId",
    created_at_attribute: "plantCreatedAt",
    modified_at_attribute: "plantModifiedAt",
    attributes: &[
        "plantName",
        "plantSex",
        "plantClonedFrom",
        "plantDescription",
    ],
    skip_attributes: &[],
    required: &["plantName"],
    defaults: &[("plantDescription", DefaultValue::Text(""))],
    enums: &[("plantSex", &["male", "female", "hermaphrodite"])],
    references: &["plantClonedFrom"],
    plural_key: "plants",
    parents: &[
        ParentLink {
            descriptor: &GENOTYPE,
            nullable: false,
        },
        ParentLink {
            descriptor: &MEDIUM,
            nullable: true,
        },
    ],
    relation: None,
    child_ids: None,
};

pub static DESCRIPTORS: [&EntityDescriptor; 6] = [
    &FAMILY,
    &GENERATION,
    &GENOTYPE,
    &PLANT,
    &ENVIRONMENT,
    &MEDIUM,
];

pub fn descriptor_by_name(name: &str) -> Option<&'static EntityDescriptor> {
    DESCRIPTORS
        .iter()
        .copied()
        .find(|descriptor| descriptor.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_by_name() {
        assert_eq!(descriptor_by_name("plant"), Some(&PLANT));
        assert!(descriptor_by_name("animal").is_none());
    }

    #[test]
    fn searchable_covers_id_timestamps_and_parent_ids() {
        assert!(GENERATION.searchable("generationId"));
        assert!(GENERATION.searchable("generationName"));
        assert!(GENERATION.searchable("generationParents"));
        assert!(GENERATION.searchable("generationCreatedAt"));
        assert!(GENERATION.searchable("familyId"));
        assert!(!GENERATION.searchable("familyName"));
    }

    #[test]
    fn relation_attribute_is_skipped_from_columns() {
        let columns: Vec<_> = GENERATION.insert_attributes().collect();
        assert_eq!(columns, vec!["generationName"]);
    }

    #[test]
    fn parent_links_terminate() {
        // Descriptors are authored without cycles; a parent walk must end
        // within the registry size.
        for descriptor in DESCRIPTORS {
            let mut current = descriptor;
            let mut hops = 0;
            while let Some(link) = current.parents.first() {
                current = link.descriptor;
                hops += 1;
                assert!(hops <= DESCRIPTORS.len(), "cycle in parent links");
            }
        }
    }

    #[test]
    fn plant_has_two_parent_chains() {
        let parents: Vec<_> = PLANT
            .parents
            .iter()
            .map(|link| link.descriptor.name)
            .collect();
        assert_eq!(parents, vec!["genotype", "medium"]);
        assert!(!PLANT.parents[0].nullable);
        assert!(PLANT.parents[1].nullable);
    }

    #[test]
    fn enum_lookup() {
        assert_eq!(
            PLANT.enum_values("plantSex"),
            Some(["male", "female", "hermaphrodite"].as_slice())
        );
        assert!(PLANT.enum_values("plantName").is_none());
    }
}
