//! End-to-end transfer runs against an in-memory DHIS2 server

mod common;

use common::{FakeServer, Workspace, INSTANCE_ATTR, ORG_UNIT_FIELD, SERIAL_ATTR};
use std::collections::HashSet;
use vatransfer::core::ingest::{filter_duplicates, merge_exports, MergeOutcome};
use vatransfer::core::reconcile::{select_match, OrgUnitResolver, TrackedEntityReconciler};
use vatransfer::core::state::{repair_quarantined, RepairTarget};
use vatransfer::core::transfer::RunOutcome;
use vatransfer::domain::{
    AttributeValue, ColumnSchema, EventCategory, ExistingTrackedEntity, InstanceId,
    OrgUnitId, OrgUnitResolution, OutcomeLabel, Program, ReconcileAction, TrackedEntityId,
    VaRecord,
};

fn three_records(ws: &Workspace) {
    ws.write_export(&[
        ("uuid:a1", "S100", "ouDistrict1"),
        ("uuid:a2", "S101", "ouDistrict1"),
        ("uuid:a3", "S102", "ouDistrict2"),
    ]);
    ws.write_cod(&[
        ("uuid:a1", "Malaria"),
        ("uuid:a2", "HIV/AIDS related death"),
        ("uuid:a3", "Road traffic accident"),
    ]);
}

fn record(instance_id: &str, serial_no: &str, facility: &str) -> VaRecord {
    let headers = vec![
        "meta-instanceID".to_string(),
        "id".to_string(),
        ORG_UNIT_FIELD.to_string(),
    ];
    let values = vec![
        instance_id.to_string(),
        serial_no.to_string(),
        facility.to_string(),
    ];
    VaRecord::from_row(&headers, &values, &ColumnSchema::default()).unwrap()
}

async fn count_of(ws: &Workspace, label: OutcomeLabel) -> u64 {
    ws.state()
        .await
        .store()
        .outcome_counts()
        .await
        .unwrap()
        .into_iter()
        .find(|(l, _)| *l == label)
        .map(|(_, n)| n)
        .unwrap_or(0)
}

#[tokio::test]
async fn test_new_batch_is_created_and_pushed() {
    let ws = Workspace::new();
    let server = FakeServer::new();
    three_records(&ws);

    let summary = ws.coordinator(server.clone()).await.run().await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(server.submissions().len(), 1);
    let payloads = server.payloads();
    assert_eq!(payloads.len(), 3);
    assert!(payloads
        .iter()
        .all(|p| p.action() == ReconcileAction::Create));
    assert_eq!(summary.pushed(), 3);
    assert_eq!(count_of(&ws, OutcomeLabel::Pushed).await, 3);
    assert!(!ws.path("new_export.csv").exists());
}

#[tokio::test]
async fn test_rerun_of_committed_batch_forwards_nothing() {
    let ws = Workspace::new();
    let first_server = FakeServer::new();
    three_records(&ws);
    ws.coordinator(first_server).await.run().await.unwrap();

    // The same export arrives again
    three_records(&ws);
    let server = FakeServer::new();
    let summary = ws.coordinator(server.clone()).await.run().await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::NothingToForward);
    assert_eq!(summary.dedup.forwarded, 0);
    assert_eq!(summary.dedup.duplicates_removed, 3);
    assert_eq!(server.calls(), 0);

    let events = ws.state().await.store().recent_events(100).await.unwrap();
    let skipped = events
        .iter()
        .filter(|e| e.category == EventCategory::Warning && e.description.contains("skipped"))
        .count();
    assert_eq!(skipped, 3);
    assert_eq!(count_of(&ws, OutcomeLabel::Pushed).await, 3);
}

#[tokio::test]
async fn test_empty_org_unit_is_quarantined_once() {
    let ws = Workspace::new();
    let server = FakeServer::new();
    ws.write_export(&[
        ("uuid:c1", "S200", "ouDistrict1"),
        ("uuid:c2", "S201", ""),
    ]);
    ws.write_cod(&[("uuid:c1", "Malaria"), ("uuid:c2", "Malaria")]);

    let summary = ws.coordinator(server.clone()).await.run().await.unwrap();

    assert_eq!(summary.quarantined, 1);
    assert_eq!(summary.resolution.unresolved, 1);
    let payloads = server.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].attribute(SERIAL_ATTR), Some("S200"));

    let quarantined = ws.state().await.store().list_unresolved().await.unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].id.as_str(), "uuid:c2");
    assert_eq!(quarantined[0].raw_org_unit, "");

    // A second run neither re-quarantines nor posts the record
    ws.write_export(&[("uuid:c2", "S201", "")]);
    let server = FakeServer::new();
    let again = ws.coordinator(server.clone()).await.run().await.unwrap();
    assert_eq!(again.outcome, RunOutcome::NothingToForward);
    assert_eq!(server.calls(), 0);
    assert_eq!(
        ws.state().await.store().list_unresolved().await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_quarantined_record_has_no_delivery_outcome() {
    let ws = Workspace::new();
    let server = FakeServer::new();
    ws.write_export(&[
        ("uuid:q1", "S300", ""),
        ("uuid:q2", "S301", "ouDistrict1"),
    ]);
    ws.write_cod(&[("uuid:q1", "Malaria"), ("uuid:q2", "Malaria")]);

    ws.coordinator(server).await.run().await.unwrap();

    let state = ws.state().await;
    let outcomes = state.store().list_outcome_identifiers().await.unwrap();
    let quarantined = state.store().list_unresolved_identifiers().await.unwrap();
    assert!(outcomes.is_disjoint(&quarantined));
    assert!(quarantined.contains(&InstanceId::new("uuid:q1").unwrap()));
    assert!(outcomes.contains(&InstanceId::new("uuid:q2").unwrap()));
}

#[tokio::test]
async fn test_repaired_record_keeps_its_cause() {
    let ws = Workspace::new();
    let config = ws.config();
    ws.write_export(&[
        ("uuid:q1", "S300", ""),
        ("uuid:q2", "S301", "ouDistrict1"),
    ]);
    ws.write_cod(&[("uuid:q1", "Malaria"), ("uuid:q2", "Malaria")]);
    ws.coordinator(FakeServer::new()).await.run().await.unwrap();

    let schema = config.transfer.column_schema();
    let carry_over = config.transfer.carry_over_path();
    let target = RepairTarget {
        carry_over: &carry_over,
        schema: &schema,
        org_unit_field: ORG_UNIT_FIELD,
    };
    repair_quarantined(
        &ws.state().await,
        target,
        &InstanceId::new("uuid:q1").unwrap(),
        Some(&OrgUnitId::new("ouDistrict1").unwrap()),
    )
    .await
    .unwrap();

    // The next results file only covers the next export
    ws.write_export(&[("uuid:q3", "S302", "ouDistrict2")]);
    ws.write_cod(&[("uuid:q3", "Stroke")]);
    let server = FakeServer::new();
    let summary = ws.coordinator(server.clone()).await.run().await.unwrap();

    assert_eq!(summary.no_cause, 0);
    assert_eq!(summary.pushed(), 2);
    assert_eq!(count_of(&ws, OutcomeLabel::NoCauseAssigned).await, 0);
    assert_eq!(count_of(&ws, OutcomeLabel::Pushed).await, 3);
    assert!(ws
        .state()
        .await
        .store()
        .list_unresolved()
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_raw_codes_resolve_through_mapping_or_quarantine() {
    let ws = Workspace::new();
    let mut config = ws.config();
    config
        .org_unit
        .mapping
        .insert("KEN".to_string(), "ouKenema001".to_string());
    ws.write_export(&[
        ("uuid:m1", "S401", "KEN-042"),
        ("uuid:m2", "S402", "Pujehun"),
        ("uuid:m3", "S403", "unresolved"),
    ]);
    ws.write_cod(&[
        ("uuid:m1", "Malaria"),
        ("uuid:m2", "Malaria"),
        ("uuid:m3", "Malaria"),
    ]);
    let server = FakeServer::new();

    let summary = ws
        .coordinator_with(config, server.clone())
        .await
        .run()
        .await
        .unwrap();

    assert_eq!(summary.resolution.from_mapping, 1);
    assert_eq!(summary.resolution.from_record_field, 0);
    let payloads = server.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].org_unit.as_str(), "ouKenema001");

    let mut raw: Vec<String> = ws
        .state()
        .await
        .store()
        .list_unresolved()
        .await
        .unwrap()
        .into_iter()
        .map(|q| q.raw_org_unit)
        .collect();
    raw.sort();
    assert_eq!(raw, vec!["Pujehun".to_string(), "unresolved".to_string()]);
}

#[tokio::test]
async fn test_matching_entity_is_updated() {
    let ws = Workspace::new();
    let server = FakeServer::new();
    server.add_entity(
        "teiExisting",
        &[(SERIAL_ATTR, "S100"), (INSTANCE_ATTR, "uuid:d1")],
    );
    let config = ws.config();
    let program = Program {
        id: "prgVA000001".to_string(),
        name: "Verbal Autopsy".to_string(),
        tracked_entity_type: "tetPerson01".to_string(),
        program_stages: vec!["stgCoD00001".to_string()],
    };
    let reconciler = TrackedEntityReconciler::new(server.clone(), program, &config.dhis, "99")
        .unwrap();

    let payload = reconciler
        .reconcile(
            &record("uuid:d1", "S100", "ouDistrict1"),
            &OrgUnitId::new("ouDistrict1").unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(payload.action(), ReconcileAction::Update);
    assert_eq!(
        payload.tracked_entity_instance,
        Some(TrackedEntityId::new("teiExisting").unwrap())
    );
}

#[tokio::test]
async fn test_existing_entity_update_is_posted() {
    let ws = Workspace::new();
    let server = FakeServer::new();
    server.add_entity(
        "teiExisting",
        &[(SERIAL_ATTR, "S100"), (INSTANCE_ATTR, "uuid:a1")],
    );
    three_records(&ws);

    let summary = ws.coordinator(server.clone()).await.run().await.unwrap();

    let payloads = server.payloads();
    let updates: Vec<_> = payloads
        .iter()
        .filter(|p| p.action() == ReconcileAction::Update)
        .collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].tracked_entity_instance.as_ref().map(|id| id.as_str()),
        Some("teiExisting")
    );
    assert_eq!(summary.pushed(), 3);
}

#[test]
fn test_instance_id_match_wins_over_search_order() {
    let e1 = ExistingTrackedEntity {
        id: TrackedEntityId::new("teiFirst001").unwrap(),
        org_unit: None,
        attributes: vec![
            AttributeValue::new(SERIAL_ATTR, "S100"),
            AttributeValue::new(INSTANCE_ATTR, "uuid:other"),
        ],
    };
    let e2 = ExistingTrackedEntity {
        id: TrackedEntityId::new("teiSecond01").unwrap(),
        org_unit: None,
        attributes: vec![
            AttributeValue::new(SERIAL_ATTR, "S100"),
            AttributeValue::new(INSTANCE_ATTR, "uuid:d1"),
        ],
    };
    let entities = vec![e1, e2];

    let matched = select_match(&entities, "uuid:d1").unwrap();
    assert_eq!(matched.id.as_str(), "teiSecond01");

    // Stable across repeated calls
    for _ in 0..3 {
        assert_eq!(
            select_match(&entities, "uuid:d1").map(|e| e.id.as_str()),
            Some("teiSecond01")
        );
    }
}

#[tokio::test]
async fn test_duplicate_filter_is_idempotent_on_overlapping_exports() {
    let ws = Workspace::new();
    let schema = ColumnSchema::default();
    common::write_csv(
        &ws.path("carry_over.csv"),
        &["meta-instanceID", "id", ORG_UNIT_FIELD],
        vec![
            vec!["uuid:1", "S1", "ou1"],
            vec!["uuid:2", "S2", "ou1"],
            vec!["uuid:3", "S3", "ou1"],
        ],
    );
    ws.write_export(&[
        ("uuid:2", "S2", "ou1"),
        ("uuid:3", "S3", "ou2"),
        ("uuid:4", "S4", "ou2"),
    ]);

    let state = ws.state().await;
    state
        .store()
        .record_outcome(
            &record("uuid:1", "S1", "ou1"),
            OutcomeLabel::Pushed,
            &OrgUnitId::new("ou1").unwrap(),
            &Default::default(),
        )
        .await
        .unwrap();

    let (outcome, report) =
        merge_exports(&ws.path("new_export.csv"), &ws.path("carry_over.csv"), &schema).unwrap();
    assert_eq!(report.merged, 4);
    assert_eq!(report.collapsed, 2);
    let MergeOutcome::Merged(mut batch) = outcome else {
        panic!("expected a merged batch");
    };

    let working = ws.path("working.csv");
    let once = filter_duplicates(&mut batch, &state, &working, &schema)
        .await
        .unwrap();
    let after_once: HashSet<String> = batch
        .records
        .iter()
        .map(|r| r.instance_id.to_string())
        .collect();

    let twice = filter_duplicates(&mut batch, &state, &working, &schema)
        .await
        .unwrap();
    let after_twice: HashSet<String> = batch
        .records
        .iter()
        .map(|r| r.instance_id.to_string())
        .collect();

    assert_eq!(once.duplicates_removed, 1);
    assert_eq!(once.forwarded, 3);
    assert_eq!(twice.duplicates_removed, 0);
    assert_eq!(after_once, after_twice);
    assert_eq!(
        after_once,
        ["uuid:2", "uuid:3", "uuid:4"]
            .into_iter()
            .map(String::from)
            .collect()
    );
}

#[test]
fn test_merge_keeps_every_valid_row() {
    let ws = Workspace::new();
    let schema = ColumnSchema::default();
    common::write_csv(
        &ws.path("carry_over.csv"),
        &["meta-instanceID", "id"],
        vec![vec!["uuid:1", "S1"], vec!["uuid:2", "S2"]],
    );
    common::write_csv(
        &ws.path("new_export.csv"),
        &["meta-instanceID", "id", "Id10057"],
        vec![
            vec!["uuid:2", "S2", "KAM"],
            vec!["uuid:5", "S5", "BOM"],
            vec!["", "S9", "BOM"],
        ],
    );

    let (outcome, report) =
        merge_exports(&ws.path("new_export.csv"), &ws.path("carry_over.csv"), &schema).unwrap();

    let MergeOutcome::Merged(batch) = outcome else {
        panic!("expected a merged batch");
    };
    let ids: Vec<&str> = batch
        .records
        .iter()
        .map(|r| r.instance_id.as_str())
        .collect();
    assert_eq!(ids, vec!["uuid:1", "uuid:2", "uuid:5"]);
    assert_eq!(report.rejected.len(), 1);
    // The later row's values win
    assert_eq!(
        batch.records[1].field("Id10057", &schema),
        Some("KAM")
    );
}

#[test]
fn test_every_record_resolves_or_is_unresolved_with_raw_value() {
    let ws = Workspace::new();
    let mut config = ws.config();
    config.org_unit.mapping.insert("KAM".to_string(), "ouKamuli001".to_string());
    let resolver = OrgUnitResolver::from_config(&config.org_unit, &config.transfer).unwrap();

    let records = [
        record("uuid:1", "S1", "ouDistrict1"),
        record("uuid:2", "S2", ""),
        record("uuid:3", "S3", "KAMULI HC"),
    ];
    for r in &records {
        match resolver.resolve(r) {
            OrgUnitResolution::Resolved { org_unit, .. } => {
                assert!(!org_unit.as_str().is_empty());
            }
            OrgUnitResolution::Unresolved { raw_value } => {
                assert_eq!(r.field(ORG_UNIT_FIELD, &ColumnSchema::default()), Some(raw_value.as_str()));
            }
        }
    }
}

#[tokio::test]
async fn test_run_resolution_counts_cover_every_forwarded_record() {
    let ws = Workspace::new();
    let server = FakeServer::new();
    ws.write_export(&[
        ("uuid:r1", "S1", "ouDistrict1"),
        ("uuid:r2", "S2", ""),
        ("uuid:r3", "S3", ""),
        ("uuid:r4", "S4", "ouDistrict2"),
    ]);
    ws.write_cod(&[
        ("uuid:r1", "Malaria"),
        ("uuid:r2", "Malaria"),
        ("uuid:r3", "Malaria"),
        ("uuid:r4", ""),
    ]);

    let summary = ws.coordinator(server).await.run().await.unwrap();

    assert_eq!(
        summary.resolution.resolved() + summary.resolution.unresolved,
        summary.dedup.forwarded
    );
    assert_eq!(summary.quarantined, summary.resolution.unresolved);
    assert_eq!(summary.no_cause, 1);
    assert_eq!(count_of(&ws, OutcomeLabel::NoCauseAssigned).await, 1);
}
