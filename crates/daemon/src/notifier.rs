//! Bridges `tether_executor::StateNotifier` (a synchronous callback invoked from inside
//! the executor) to the broadcaster's async fan-out.

use std::sync::Arc;
use tether_core::Project;
use tether_executor::StateNotifier;
use tether_server::Broadcaster;
use tether_wire::ServerMessage;

pub struct BroadcastNotifier {
    broadcaster: Arc<Broadcaster>,
}

impl BroadcastNotifier {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self { broadcaster }
    }
}

impl StateNotifier for BroadcastNotifier {
    fn project_changed(&self, project: &Project) {
        let broadcaster = self.broadcaster.clone();
        let project = project.clone();
        tokio::spawn(async move {
            broadcaster.broadcast(&project.id.clone(), ServerMessage::ProjectState(project)).await;
        });
    }
}
