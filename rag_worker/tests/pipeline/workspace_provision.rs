use common::dtos::{
    status_events::{WorkspaceStatus, WorkspaceStatusUpdatedDto},
    workspace_events::WorkspaceProvisionDto,
};
use rag_worker::{configuration::Stage, ports::document_repository::WorkspaceRepository};
use serde_json::json;
use uuid::Uuid;

use crate::helpers::{spawn_app, wait_until};

fn provision_event() -> WorkspaceProvisionDto {
    WorkspaceProvisionDto {
        workspace_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        name: "Research notes".to_string(),
        metadata: json!({}),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn provisioned_workspace_becomes_ready() {
    // Arrange
    let app = spawn_app().await;
    let event = provision_event();

    // Act
    app.publish(&event).await;

    // Assert
    let ready = wait_until(|| async {
        app.workspaces
            .get(event.workspace_id)
            .await
            .unwrap()
            .map(|workspace| workspace.status == WorkspaceStatus::Ready)
            .unwrap_or(false)
    })
    .await;
    assert!(ready);

    let workspace = app.workspaces.get(event.workspace_id).await.unwrap().unwrap();
    assert_eq!(workspace.user_id, event.user_id);
    assert_eq!(workspace.name, event.name);
    assert_eq!(workspace.status_message, None);

    assert!(wait_until(|| async {
        !app.published::<WorkspaceStatusUpdatedDto>().await.is_empty()
    })
    .await);
    let published = app.published::<WorkspaceStatusUpdatedDto>().await;
    assert_eq!(published[0].workspace_id, event.workspace_id);
    assert_eq!(published[0].status, WorkspaceStatus::Ready);

    app.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn provisioning_a_ready_workspace_again_is_acknowledged() {
    // Arrange
    let app = spawn_app().await;
    let event = provision_event();
    let provision_queue = app.queue_name(Stage::WorkspaceProvision);

    // Act
    app.publish(&event).await;
    app.publish(&event).await;

    // Assert
    assert!(wait_until(|| async { app.broker.acked_count(&provision_queue).await == 2 }).await);
    assert_eq!(app.broker.requeued_count(&provision_queue).await, 0);
    let workspace = app.workspaces.get(event.workspace_id).await.unwrap().unwrap();
    assert_eq!(workspace.status, WorkspaceStatus::Ready);

    app.stop().await;
}
