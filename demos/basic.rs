use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use record_router::{
    Connector, ConnectorError, Delivery, Dispatcher, DispatcherConfig, Record, RecordKind, Route,
};

/// Prints deliveries to stdout instead of talking to a real backend.
struct ConsoleConnector;

#[async_trait]
impl Connector for ConsoleConnector {
    async fn deliver(
        &self,
        record: &Record,
        delivery: &Delivery,
    ) -> Result<serde_json::Value, ConnectorError> {
        println!(
            "delivering record {} to target {}",
            record.id.0, delivery.target
        );
        Ok(json!({"printed": true}))
    }
}

#[tokio::main]
async fn main() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default());

    dispatcher
        .register_connector("sheet", Arc::new(ConsoleConnector))
        .await;

    let route = Route::new("route_expenses", "tenant_a", "expenses to sheet")
        .with_condition("kind", serde_json::from_value(json!("expense")).unwrap())
        .with_condition(
            "amount",
            serde_json::from_value(json!({">": 0})).unwrap(),
        )
        .with_action("sheet", "{{project_id}}");
    dispatcher.add_route(route).await.expect("route stored");

    let record = Record::new("exp_123", "tenant_a", RecordKind::Expense)
        .with_field("amount", 1500)
        .with_field("currency", "EUR")
        .with_field("project_id", "P1");

    let report = dispatcher.process_record(record).await.expect("processed");

    println!(
        "routes matched: {}, deliveries created: {}",
        report.routes_matched, report.deliveries_created
    );
    for delivery in &report.deliveries {
        println!(
            "  {} via {} -> {} [{}]",
            delivery.id.0,
            delivery.connector.0,
            delivery.target,
            delivery.status.as_str()
        );
    }
}
