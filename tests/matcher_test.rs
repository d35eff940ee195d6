use record_router::{
    idempotency_key, matches, resolve_target, MatchError, MatchPredicate, Record, RecordId,
    RecordKind, RouteId, TenantId,
};
use serde_json::json;

fn predicate(value: serde_json::Value) -> MatchPredicate {
    serde_json::from_value(value).expect("predicate decodes")
}

fn expense(amount: i64) -> Record {
    Record::new("rec_1", "t1", RecordKind::Expense)
        .with_field("amount", amount)
        .with_field("currency", "EUR")
        .with_field("category", "Food & Dining")
}

#[test]
fn scalar_condition_is_exact_equality() {
    let p = predicate(json!({"kind": "expense"}));
    assert!(matches(&expense(100), &p).unwrap());

    let task = Record::new("rec_2", "t1", RecordKind::Task);
    assert!(!matches(&task, &p).unwrap());
}

#[test]
fn scalar_equality_does_not_coerce() {
    let p = predicate(json!({"amount": "1500"}));
    assert!(!matches(&expense(1500), &p).unwrap());

    let p = predicate(json!({"amount": 1500}));
    assert!(matches(&expense(1500), &p).unwrap());
}

#[test]
fn all_pairs_must_match() {
    let p = predicate(json!({"kind": "expense", "currency": "USD"}));
    assert!(!matches(&expense(100), &p).unwrap());

    let p = predicate(json!({"kind": "expense", "currency": "EUR"}));
    assert!(matches(&expense(100), &p).unwrap());
}

#[test]
fn list_condition_is_membership() {
    let p = predicate(json!({"currency": ["USD", "EUR", "GBP"]}));
    assert!(matches(&expense(100), &p).unwrap());

    let p = predicate(json!({"currency": ["USD", "GBP"]}));
    assert!(!matches(&expense(100), &p).unwrap());
}

#[test]
fn ordering_operators_compare_numbers() {
    let p = predicate(json!({"amount": {">": 1000}}));
    assert!(matches(&expense(1500), &p).unwrap());
    assert!(!matches(&expense(500), &p).unwrap());
    assert!(!matches(&expense(1000), &p).unwrap());

    let p = predicate(json!({"amount": {">=": 1000, "<=": 2000}}));
    assert!(matches(&expense(1000), &p).unwrap());
    assert!(matches(&expense(2000), &p).unwrap());
    assert!(!matches(&expense(2001), &p).unwrap());

    let p = predicate(json!({"amount": {"<": 1000}}));
    assert!(matches(&expense(999), &p).unwrap());
}

#[test]
fn ordering_operators_never_coerce_strings() {
    let p = predicate(json!({"currency": {">": 10}}));
    assert!(!matches(&expense(100), &p).unwrap());
}

#[test]
fn equality_operators() {
    let p = predicate(json!({"currency": {"=": "EUR"}}));
    assert!(matches(&expense(100), &p).unwrap());

    let p = predicate(json!({"currency": {"==": "EUR"}}));
    assert!(matches(&expense(100), &p).unwrap());

    let p = predicate(json!({"currency": {"!=": "USD"}}));
    assert!(matches(&expense(100), &p).unwrap());

    let p = predicate(json!({"currency": {"!=": "EUR"}}));
    assert!(!matches(&expense(100), &p).unwrap());
}

#[test]
fn contains_is_case_insensitive_substring() {
    let p = predicate(json!({"category": {"contains": "food"}}));
    assert!(matches(&expense(100), &p).unwrap());

    let p = predicate(json!({"category": {"contains": "DINING"}}));
    assert!(matches(&expense(100), &p).unwrap());

    let p = predicate(json!({"category": {"contains": "travel"}}));
    assert!(!matches(&expense(100), &p).unwrap());
}

#[test]
fn contains_stringifies_both_sides() {
    let p = predicate(json!({"amount": {"contains": 50}}));
    assert!(matches(&expense(1500), &p).unwrap());
}

#[test]
fn membership_operators() {
    let p = predicate(json!({"currency": {"in": ["EUR", "USD"]}}));
    assert!(matches(&expense(100), &p).unwrap());

    let p = predicate(json!({"currency": {"not_in": ["EUR", "USD"]}}));
    assert!(!matches(&expense(100), &p).unwrap());

    let p = predicate(json!({"currency": {"not_in": ["GBP"]}}));
    assert!(matches(&expense(100), &p).unwrap());
}

#[test]
fn membership_operand_must_be_a_list() {
    let p = predicate(json!({"currency": {"in": "EUR"}}));
    let err = matches(&expense(100), &p).unwrap_err();
    assert!(matches!(err, MatchError::InvalidOperand { .. }));
}

#[test]
fn nested_paths_resolve_through_objects() {
    let record = Record::new("rec_3", "t1", RecordKind::Task)
        .with_field("assignee", json!({"id": "42", "name": "Dana"}));

    let p = predicate(json!({"assignee.id": "42"}));
    assert!(matches(&record, &p).unwrap());

    let p = predicate(json!({"assignee.id": "7"}));
    assert!(!matches(&record, &p).unwrap());
}

#[test]
fn missing_paths_resolve_to_null_without_erroring() {
    let record = Record::new("rec_4", "t1", RecordKind::Task);

    let p = predicate(json!({"assignee.id": {"exists": true}}));
    assert!(!matches(&record, &p).unwrap());

    let p = predicate(json!({"assignee.id": {"exists": false}}));
    assert!(matches(&record, &p).unwrap());

    // A null scalar condition matches an absent field.
    let p = predicate(json!({"assignee.id": null}));
    assert!(matches(&record, &p).unwrap());
}

#[test]
fn exists_requires_boolean_operand() {
    let record = Record::new("rec_5", "t1", RecordKind::Task);
    let p = predicate(json!({"title": {"exists": "yes"}}));
    let err = matches(&record, &p).unwrap_err();
    assert!(matches!(err, MatchError::InvalidOperand { .. }));
}

#[test]
fn unknown_operator_is_a_hard_error() {
    let p = predicate(json!({"amount": {"~=": 100}}));
    let err = matches(&expense(100), &p).unwrap_err();
    assert_eq!(
        err,
        MatchError::UnknownOperator {
            operator: "~=".to_string()
        }
    );
}

#[test]
fn empty_predicate_matches_everything() {
    let p = MatchPredicate::new();
    assert!(matches(&expense(1), &p).unwrap());
}

#[test]
fn template_without_placeholders_is_unchanged() {
    let record = expense(100);
    assert_eq!(resolve_target("sheet-123", &record), "sheet-123");
}

#[test]
fn template_resolves_nested_paths() {
    let record = Record::new("rec_6", "t1", RecordKind::Expense)
        .with_field("user", json!({"tg_chat_id": "555"}))
        .with_field("project_id", "P1");

    assert_eq!(resolve_target("{{user.tg_chat_id}}", &record), "555");
    assert_eq!(
        resolve_target("chat/{{user.tg_chat_id}}/project/{{project_id}}", &record),
        "chat/555/project/P1"
    );
}

#[test]
fn unresolved_placeholder_is_left_intact() {
    let record = expense(100);
    assert_eq!(
        resolve_target("{{missing.field}}", &record),
        "{{missing.field}}"
    );
    assert_eq!(
        resolve_target("sheet/{{missing}}/tab", &record),
        "sheet/{{missing}}/tab"
    );
}

#[test]
fn non_string_values_render_as_json() {
    let record = expense(1500);
    assert_eq!(resolve_target("amt-{{amount}}", &record), "amt-1500");
}

#[test]
fn unterminated_placeholder_is_copied_through() {
    let record = expense(100);
    assert_eq!(resolve_target("sheet/{{currency", &record), "sheet/{{currency");
}

#[test]
fn idempotency_key_is_deterministic() {
    let t = TenantId("t1".to_string());
    let r = RecordId("rec_1".to_string());
    let route = RouteId("route_1".to_string());

    assert_eq!(idempotency_key(&t, &r, &route), idempotency_key(&t, &r, &route));
}

#[test]
fn idempotency_key_distinguishes_inputs() {
    let t = TenantId("t1".to_string());
    let r = RecordId("rec_1".to_string());
    let a = RouteId("route_1".to_string());
    let b = RouteId("route_2".to_string());

    assert_ne!(idempotency_key(&t, &r, &a), idempotency_key(&t, &r, &b));

    let t2 = TenantId("t2".to_string());
    assert_ne!(idempotency_key(&t, &r, &a), idempotency_key(&t2, &r, &a));
}
