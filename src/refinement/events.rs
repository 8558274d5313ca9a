// Session events streamed to the host UI

use serde::Serialize;
use tokio::sync::mpsc;

use crate::protocol::{Artifact, ClarifyingQuestion, CritiqueResult, Phase};

/// One observable step of a refinement session, in emission order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChange { from: Phase, to: Phase },
    Questions(Vec<ClarifyingQuestion>),
    DraftReady(String),
    CritiqueReady(CritiqueResult),
    ArtifactReady(Artifact),
    Progress(String),
    Error(String),
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::StateChange { .. } => "state_change",
            SessionEvent::Questions(_) => "questions",
            SessionEvent::DraftReady(_) => "draft_ready",
            SessionEvent::CritiqueReady(_) => "critique_ready",
            SessionEvent::ArtifactReady(_) => "artifact_ready",
            SessionEvent::Progress(_) => "progress",
            SessionEvent::Error(_) => "error",
        }
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Sending half held by the session. A dropped receiver is not an error:
/// the session keeps running headless.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSender {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: SessionEvent) {
        tracing::trace!(kind = event.kind(), "Session event");
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (tx, mut rx) = EventSender::channel();
        tx.emit(SessionEvent::Progress("one".into()));
        tx.emit(SessionEvent::DraftReady("two".into()));
        assert_eq!(rx.recv().await.unwrap().kind(), "progress");
        assert_eq!(rx.recv().await.unwrap().kind(), "draft_ready");
    }

    #[test]
    fn test_emit_without_receiver_is_silent() {
        let (tx, rx) = EventSender::channel();
        drop(rx);
        tx.emit(SessionEvent::Error("nobody listening".into()));
    }

    #[test]
    fn test_state_change_serializes_both_phases() {
        let event = SessionEvent::StateChange {
            from: Phase::Idle,
            to: Phase::Drafting,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state_change");
        assert_eq!(json["data"]["from"]["state"], "idle");
        assert_eq!(json["data"]["to"]["state"], "drafting");
    }
}
