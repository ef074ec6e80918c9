//! Automatic acceptance of incoming friend requests.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::api::{ApiError, ModerationApi, RELATIONSHIP_INCOMING};

/// Accept every pending incoming request. Returns how many were accepted.
pub async fn accept_pending(api: &dyn ModerationApi) -> Result<usize, ApiError> {
    let relationships = api.get_relationships().await?;
    let mut accepted = 0;

    for request in relationships.iter().filter(|r| r.kind == RELATIONSHIP_INCOMING) {
        match api.accept_friend_request(request.id).await {
            Ok(()) => {
                info!("Accepted friend request from {}", request.id);
                accepted += 1;
            }
            Err(e) => warn!("Failed to accept friend request from {}: {}", request.id, e),
        }
    }

    Ok(accepted)
}

/// Poll for friend requests every `every` until the process exits.
pub fn spawn_poller(api: Arc<dyn ModerationApi>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = accept_pending(api.as_ref()).await {
                warn!("Friend request check failed: {}", e);
            }
        }
    })
}
