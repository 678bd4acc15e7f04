use std::time::Duration;

use common::dtos::{
    document_events::DocumentUploadedDto,
    status_events::{DocumentProcessingStatus, WorkspaceStatus, WorkspaceStatusUpdatedDto},
};
use rag_worker::domain::services::status_broadcaster::StatusNotification;
use serde_json::json;
use tokio::{sync::broadcast::Receiver, time::timeout};
use uuid::Uuid;

use crate::helpers::{spawn_app, three_chunks_text};

/// Next notification of the channel, `None` after 5s of silence
async fn next_notification(receiver: &mut Receiver<StatusNotification>) -> Option<StatusNotification> {
    timeout(Duration::from_secs(5), receiver.recv())
        .await
        .ok()
        .and_then(Result::ok)
}

#[tokio::test(flavor = "multi_thread")]
async fn document_statuses_reach_the_channel_of_their_user() {
    // Arrange
    let app = spawn_app().await;
    let document = app.seed_document("notes.md", &three_chunks_text()).await;
    let mut receiver = app.broadcaster.subscribe(document.user_id).await;
    let mut other_user_receiver = app.broadcaster.subscribe(Uuid::new_v4()).await;

    // Act
    app.publish(&DocumentUploadedDto {
        document_id: document.id,
        workspace_id: document.workspace_id,
        filename: document.filename.clone(),
        storage_path: document.storage_path.clone(),
        metadata: json!({}),
    })
    .await;

    // Assert
    let mut statuses = vec![];
    while let Some(notification) = next_notification(&mut receiver).await {
        assert_eq!(notification.event_name(), "document_status");
        if let StatusNotification::DocumentStatus(event) = notification {
            assert_eq!(event.document_id, document.id);
            statuses.push(event.status);
            if event.status == DocumentProcessingStatus::Ready {
                break;
            }
        }
    }
    assert_eq!(
        statuses,
        vec![
            DocumentProcessingStatus::Processing,
            DocumentProcessingStatus::Ready
        ]
    );
    assert!(other_user_receiver.try_recv().is_err());

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn workspace_statuses_reach_the_channel_of_their_user() {
    // Arrange
    let app = spawn_app().await;
    let user_id = Uuid::new_v4();
    let mut receiver = app.broadcaster.subscribe(user_id).await;
    let event = WorkspaceStatusUpdatedDto {
        workspace_id: Uuid::new_v4(),
        user_id,
        status: WorkspaceStatus::Ready,
        message: None,
        name: "Research".to_string(),
    };

    // Act
    app.publish(&event).await;

    // Assert
    let notification = next_notification(&mut receiver)
        .await
        .expect("No notification was broadcast");
    assert_eq!(notification, StatusNotification::WorkspaceStatus(event));

    app.stop().await;
}
