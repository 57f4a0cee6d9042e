// Cross-module tests: envelopes through the queue transport, redrive
// into the dead-letter shape, and authoring-time validation of a whole
// workflow definition.

use uuid::Uuid;

use super::fixtures::{execution_fixture, step_envelope_fixture, WorkflowFixture};
use crate::queue::{
    DeadLetterEnvelope, MemoryQueue, MessageQueue, DEAD_LETTER_QUEUE, STEP_QUEUE,
};
use crate::workflows::envelope::StepEnvelope;
use crate::workflows::model::ExecutionStatus;
use crate::workflows::ActionDispatcher;

#[tokio::test]
async fn test_step_envelope_round_trips_through_queue() {
    let queue = MemoryQueue::new(30, 3);
    let fixture = WorkflowFixture::booking_follow_up(Uuid::new_v4());
    let envelope = step_envelope_fixture(&fixture.workflow, &fixture.steps[0]);

    queue
        .send(STEP_QUEUE, serde_json::to_value(&envelope).unwrap())
        .await
        .unwrap();

    let received = queue.receive(STEP_QUEUE, 10).await.unwrap();
    assert_eq!(received.len(), 1);

    let parsed: StepEnvelope = serde_json::from_value(received[0].payload.clone()).unwrap();
    assert_eq!(parsed.execution_id, envelope.execution_id);
    assert_eq!(parsed.step_id, fixture.steps[0].id);
    assert_eq!(parsed.action, "send_sms");
}

#[tokio::test]
async fn test_exhausted_step_arrives_in_dead_letter_shape() {
    // Visibility timeout of zero stands in for expired redelivery windows.
    let queue = MemoryQueue::new(0, 3);
    let fixture = WorkflowFixture::booking_follow_up(Uuid::new_v4());
    let envelope = step_envelope_fixture(&fixture.workflow, &fixture.steps[0]);

    queue
        .send(STEP_QUEUE, serde_json::to_value(&envelope).unwrap())
        .await
        .unwrap();

    // Three failed deliveries, then the redrive policy takes over.
    for _ in 0..3 {
        assert_eq!(queue.receive(STEP_QUEUE, 10).await.unwrap().len(), 1);
    }
    assert!(queue.receive(STEP_QUEUE, 10).await.unwrap().is_empty());

    let dead = queue.receive(DEAD_LETTER_QUEUE, 10).await.unwrap();
    assert_eq!(dead.len(), 1);

    let dead_envelope: DeadLetterEnvelope =
        serde_json::from_value(dead[0].payload.clone()).unwrap();
    assert_eq!(dead_envelope.approximate_receive_count, 3);
    assert_eq!(dead_envelope.source_queue, STEP_QUEUE);

    // The original step envelope survives intact for the processor.
    let original: StepEnvelope = serde_json::from_value(dead_envelope.original).unwrap();
    assert_eq!(original.execution_id, envelope.execution_id);
    assert_eq!(original.workflow_id, fixture.workflow.id);
}

#[test]
fn test_execution_fixture_state_classification() {
    let fixture = WorkflowFixture::booking_follow_up(Uuid::new_v4());

    let waiting = execution_fixture(&fixture.workflow, ExecutionStatus::Waiting);
    assert!(waiting.status.is_active());
    assert_eq!(waiting.record_type, "booking");

    let cancelled = execution_fixture(&fixture.workflow, ExecutionStatus::Cancelled);
    assert!(cancelled.status.is_terminal());
    assert!(!cancelled.status.is_active());
}

#[test]
fn test_fixture_workflow_passes_authoring_validation() {
    let dispatcher = ActionDispatcher::new();
    let fixture = WorkflowFixture::booking_follow_up(Uuid::new_v4());

    for step in &fixture.steps {
        let outcome = dispatcher.validate(&step.action_type, &step.action_config);
        assert!(
            outcome.valid,
            "step {} failed validation: {:?}",
            step.action_type, outcome.errors
        );
    }
}
