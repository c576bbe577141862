//! End-to-end runs of a document intake workflow.
//!
//! Classify, route on confidence, prepare extraction input, extract, then
//! compute the downstream action with a parameter projection.

use std::sync::Arc;

use serde_json::{Value, json};
use waypoint_engine::{
    EngineConfig, ExecutionEngine, ExecutionStatus, ScriptedUnit, StepStatus, UnitRegistry,
    Workflow,
};

fn intake_workflow() -> Workflow {
    Workflow::from_json(
        &json!({
            "name": "document-intake",
            "start": "ClassifyDocument",
            "states": {
                "ClassifyDocument": {
                    "type": "invoke",
                    "unit": "classify",
                    "input_path": "document",
                    "result_path": "classificationResult",
                    "next": "CheckConfidence"
                },
                "CheckConfidence": {
                    "type": "branch",
                    "choices": [
                        {"condition": "classificationResult.confidence < 0.7", "next": "ManualReview"}
                    ],
                    "default": "PrepareExtraction"
                },
                "ManualReview": {
                    "type": "fail",
                    "error": "NeedsReview",
                    "cause": "classification confidence below threshold"
                },
                "PrepareExtraction": {
                    "type": "transform",
                    "expression": "merge(document, {metadata: {classified: true, type: classificationResult.documentType}})",
                    "result_path": "extractionInput",
                    "next": "ExtractData"
                },
                "ExtractData": {
                    "type": "invoke",
                    "unit": "extract",
                    "input_path": "extractionInput",
                    "result_path": "extractionResult",
                    "next": "DetermineAction"
                },
                "DetermineAction": {
                    "type": "transform",
                    "parameters": {
                        "documentId.$": "document.id",
                        "actionType.$": "classificationResult.documentType == \"INVOICE\" ? \"processPayment\" : \"createOrder\""
                    },
                    "result_path": "action",
                    "next": "Done"
                },
                "Done": {"type": "succeed"}
            }
        })
        .to_string(),
    )
    .unwrap()
}

async fn engine_with(classification: Value) -> (ExecutionEngine, Arc<ScriptedUnit>) {
    let extract = Arc::new(ScriptedUnit::always(
        "extract",
        json!({"invoiceNumber": "INV-42", "total": 120.5}),
    ));
    let mut units = UnitRegistry::new();
    units.register(ScriptedUnit::always("classify", classification));
    units.register_arc(extract.clone());

    let engine = ExecutionEngine::new(units, EngineConfig::default());
    engine.register_workflow(intake_workflow()).await.unwrap();
    (engine, extract)
}

#[tokio::test]
async fn test_confident_invoice_is_routed_to_payment() {
    let (engine, extract) =
        engine_with(json!({"documentType": "INVOICE", "confidence": 0.94})).await;

    let result = engine
        .execute("document-intake", json!({"document": {"id": "d1"}}))
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.output["action"]["actionType"], json!("processPayment"));
    assert_eq!(result.output["action"]["documentId"], json!("d1"));
    assert_eq!(
        result.output["extractionInput"],
        json!({"id": "d1", "metadata": {"classified": true, "type": "INVOICE"}})
    );
    // Prior fields survive every non-root injection.
    assert_eq!(result.output["document"], json!({"id": "d1"}));
    assert_eq!(result.output["extractionResult"]["invoiceNumber"], json!("INV-42"));

    assert_eq!(
        result.history.path(),
        vec![
            "ClassifyDocument",
            "CheckConfidence",
            "PrepareExtraction",
            "ExtractData",
            "DetermineAction",
            "Done"
        ]
    );
    assert_eq!(
        extract.calls()[0].input,
        json!({"id": "d1", "metadata": {"classified": true, "type": "INVOICE"}})
    );
}

#[tokio::test]
async fn test_order_document_creates_order() {
    let (engine, _) = engine_with(json!({"documentType": "PURCHASE_ORDER", "confidence": 0.88})).await;
    let result = engine
        .execute("document-intake", json!({"document": {"id": "d2"}}))
        .await
        .unwrap();
    assert_eq!(result.output["action"]["actionType"], json!("createOrder"));
}

#[tokio::test]
async fn test_low_confidence_goes_to_manual_review() {
    let (engine, extract) =
        engine_with(json!({"documentType": "INVOICE", "confidence": 0.5})).await;

    let result = engine
        .execute("document-intake", json!({"document": {"id": "d1"}}))
        .await
        .unwrap();

    assert_eq!(
        result.history.path(),
        vec!["ClassifyDocument", "CheckConfidence", "ManualReview"]
    );
    assert!(!result.history.visited("PrepareExtraction"));
    assert_eq!(extract.call_count(), 0);
    assert!(result.output.get("extractionInput").is_none());

    let ExecutionStatus::Failed { category, cause } = &result.status else {
        panic!("expected failed status, got {:?}", result.status);
    };
    assert_eq!(category.as_str(), "NeedsReview");
    assert!(cause.contains("confidence"));
    assert_eq!(
        result.history.last().map(|r| r.status),
        Some(StepStatus::Failed)
    );
}

#[tokio::test]
async fn test_history_snapshots_are_isolated() {
    let (engine, _) = engine_with(json!({"documentType": "INVOICE", "confidence": 0.94})).await;
    let result = engine
        .execute("document-intake", json!({"document": {"id": "d1"}}))
        .await
        .unwrap();

    let records = result.history.records();
    assert_eq!(records[0].input, json!({"document": {"id": "d1"}}));
    assert!(records[0].output.get("classificationResult").is_some());
    assert!(records[0].output.get("extractionInput").is_none());
    for pair in records.windows(2) {
        assert_eq!(pair[0].output, pair[1].input);
        assert_eq!(pair[0].next.as_deref(), Some(pair[1].state.as_str()));
    }
}

#[tokio::test]
async fn test_parallel_executions_do_not_share_documents() {
    let (engine, _) = engine_with(json!({"documentType": "INVOICE", "confidence": 0.94})).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        handles.push(
            engine
                .spawn("document-intake", json!({"document": {"id": format!("d{i}")}}))
                .await
                .unwrap(),
        );
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.wait().await.unwrap();
        assert!(result.status.is_success());
        assert_eq!(result.output["action"]["documentId"], json!(format!("d{i}")));
    }
}
