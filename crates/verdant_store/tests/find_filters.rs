use serde_json::json;

use verdant_store::descriptor::{FAMILY, GENERATION, PLANT};
use verdant_store::{
    Criteria, RecordCreateApi, RecordQueryApi, VerdantError, VerdantResult, VerdantStore,
};

async fn seed_families(store: &VerdantStore, names: &[&str]) -> VerdantResult<Vec<i64>> {
    let mut ids = Vec::new();
    for name in names {
        let created = store.create(&FAMILY, json!({"familyName": name})).await?;
        let (id, _) = created.single("families").expect("one family");
        ids.push(id);
    }
    Ok(ids)
}

#[tokio::test]
async fn equality_filter_matches_one_row() -> VerdantResult<()> {
    let store = VerdantStore::connect_in_memory().await?;
    let ids = seed_families(&store, &["Haze", "Kush", "Skunk"]).await?;

    let found = store
        .find(
            &FAMILY,
            Criteria {
                filter: Some(json!({"familyName": "Kush"})),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(found.found, 1);
    let group = found.group("families").expect("families");
    assert!(group.contains_key(&ids[1]));
    Ok(())
}

#[tokio::test]
async fn array_filter_combines_with_or() -> VerdantResult<()> {
    let store = VerdantStore::connect_in_memory().await?;
    seed_families(&store, &["Haze", "Kush", "Skunk"]).await?;

    let found = store
        .find(
            &FAMILY,
            Criteria {
                filter: Some(json!([{"familyName": "Haze"}, {"familyName": "Kush"}])),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(found.found, 2);
    Ok(())
}

#[tokio::test]
async fn operator_map_composes_a_range() -> VerdantResult<()> {
    let store = VerdantStore::connect_in_memory().await?;
    let ids = seed_families(&store, &["a", "b", "c", "d"]).await?;

    let found = store
        .find(
            &FAMILY,
            Criteria {
                filter: Some(json!({"familyId": {"$gte": ids[1], "$lte": ids[2]}})),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(found.found, 2);
    Ok(())
}

#[tokio::test]
async fn sort_limit_and_offset_page_through_results() -> VerdantResult<()> {
    let store = VerdantStore::connect_in_memory().await?;
    seed_families(&store, &["a", "b", "c", "d", "e"]).await?;

    let found = store
        .find(
            &FAMILY,
            Criteria {
                sort: vec![verdant_store::SortTerm::parse("familyName DESC")?],
                limit: Some(2),
                offset: Some(1),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(found.found, 5);
    let group = found.group("families").expect("families");
    assert_eq!(group.len(), 2);
    let names: Vec<_> = group
        .values()
        .map(|record| record.get("familyName").cloned())
        .collect();
    assert!(names.contains(&Some(json!("d"))) && names.contains(&Some(json!("c"))));
    assert_eq!(found.remaining, 2);
    Ok(())
}

#[tokio::test]
async fn projection_restricts_returned_attributes() -> VerdantResult<()> {
    let store = VerdantStore::connect_in_memory().await?;
    seed_families(&store, &["Haze"]).await?;

    let found = store
        .find(
            &FAMILY,
            Criteria {
                attributes: vec!["familyName".to_string()],
                ..Default::default()
            },
        )
        .await?;
    let record = found
        .group("families")
        .and_then(|group| group.values().next())
        .expect("record");
    assert!(record.get("familyName").is_some());
    assert!(record.get("familyDescription").is_none());
    // The primary key is always projected.
    assert!(record.get("familyId").is_some());
    Ok(())
}

#[tokio::test]
async fn exact_set_relation_matches_whole_sets_only() -> VerdantResult<()> {
    let store = VerdantStore::connect_in_memory().await?;
    // Two mother plants in an F1 generation.
    let first = store
        .create(
            &PLANT,
            json!({"familyName": "Haze", "generationName": "F1", "plantName": "mother-a"}),
        )
        .await?;
    let (family_id, _) = first.single("families").expect("family");
    let (plant_a, _) = first.single("plants").expect("plant");
    let second = store
        .create(
            &PLANT,
            json!({
                "generationId": first.single("generations").expect("generation").0,
                "plantName": "mother-b"
            }),
        )
        .await?;
    let (plant_b, _) = second.single("plants").expect("plant");

    let both = store
        .create(
            &GENERATION,
            json!({
                "familyId": family_id,
                "generationName": "F2",
                "generationParents": [plant_a, plant_b]
            }),
        )
        .await?;
    let (generation_both, _) = both.single("generations").expect("generation");
    let only_a = store
        .create(
            &GENERATION,
            json!({
                "familyId": family_id,
                "generationName": "F2-selfed",
                "generationParents": [plant_a]
            }),
        )
        .await?;
    let (generation_a, _) = only_a.single("generations").expect("generation");

    let found = store
        .find(
            &GENERATION,
            Criteria {
                filter: Some(json!({"generationParents": [plant_a, plant_b]})),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(found.found, 1);
    let group = found.group("generations").expect("generations");
    assert!(group.contains_key(&generation_both));
    let record = group.get(&generation_both).expect("record");
    assert_eq!(
        record.get("generationParents"),
        Some(&json!([plant_a, plant_b]))
    );

    // A subset must not match the larger set.
    let found = store
        .find(
            &GENERATION,
            Criteria {
                filter: Some(json!({"generationParents": [plant_a]})),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(found.found, 1);
    let group = found.group("generations").expect("generations");
    assert!(group.contains_key(&generation_a));
    assert!(!group.contains_key(&generation_both));
    Ok(())
}

#[tokio::test]
async fn unknown_filter_attribute_is_rejected() -> VerdantResult<()> {
    let store = VerdantStore::connect_in_memory().await?;
    let err = store
        .find(
            &FAMILY,
            Criteria {
                filter: Some(json!({"familyColor": "green"})),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VerdantError::UnknownAttribute { .. }));
    Ok(())
}
