// src/broadcast.rs
//
// Fan-out of camera events to live viewer sessions. Each session carries
// its own reported viewport, so coordinate-bearing events are mapped into
// that session's render space at send time; a resized or late-joining
// viewer always sees correctly scaled overlays.

use crate::events::CameraEvent;
use crate::geometry::TargetPolygon;
use crate::render::RenderSpace;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type SessionId = u64;

struct Session {
    tx: mpsc::UnboundedSender<String>,
    viewport: Option<(u32, u32)>,
}

#[derive(Default)]
pub struct EventBroadcaster {
    cameras: Mutex<HashMap<String, HashMap<SessionId, Session>>>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, HashMap<SessionId, Session>>> {
        self.cameras.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a viewer for one camera's events. The session starts with
    /// no viewport and receives no coordinate-bearing events until it
    /// reports one.
    pub fn subscribe(&self, cam_id: &str) -> (SessionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut cameras = self.sessions();
        let sessions = cameras.entry(cam_id.to_string()).or_default();
        sessions.insert(id, Session { tx, viewport: None });
        info!(camera = cam_id, session = id, total = sessions.len(), "viewer connected");
        (id, rx)
    }

    pub fn unsubscribe(&self, cam_id: &str, session_id: SessionId) {
        let mut cameras = self.sessions();
        if let Some(sessions) = cameras.get_mut(cam_id) {
            if sessions.remove(&session_id).is_some() {
                info!(
                    camera = cam_id,
                    session = session_id,
                    remaining = sessions.len(),
                    "viewer disconnected"
                );
            }
        }
    }

    /// Handles a viewer's `video_size` control message: stores the viewport
    /// and immediately re-sends the calibration polygon in the new render
    /// space, or an error event while the camera is uncalibrated.
    pub fn report_viewport(
        &self,
        cam_id: &str,
        session_id: SessionId,
        viewport: (u32, u32),
        polygon: Option<&TargetPolygon>,
        frame_size: Option<(u32, u32)>,
    ) {
        let mut cameras = self.sessions();
        let Some(session) = cameras
            .get_mut(cam_id)
            .and_then(|sessions| sessions.get_mut(&session_id))
        else {
            return;
        };
        session.viewport = Some(viewport);

        let event = match polygon {
            Some(polygon) => CameraEvent::Polygon {
                points: polygon.points(),
            },
            None => CameraEvent::Error {
                reason: "no_target".to_string(),
            },
        };
        let space = RenderSpace::new(frame_size, session.viewport);
        if let Some(rendered) = event.to_render(space.as_ref()) {
            send(session, &rendered);
        }
    }

    /// Delivers an event to every session of a camera, mapped through each
    /// session's current viewport. Sessions without a viewport are skipped
    /// for coordinate-bearing events; a failed send removes only that
    /// session.
    pub fn publish(&self, cam_id: &str, event: &CameraEvent, frame_size: Option<(u32, u32)>) {
        let mut cameras = self.sessions();
        let Some(sessions) = cameras.get_mut(cam_id) else {
            return;
        };

        let mut dead = Vec::new();
        for (id, session) in sessions.iter() {
            let space = RenderSpace::new(frame_size, session.viewport);
            let Some(rendered) = event.to_render(space.as_ref()) else {
                continue;
            };
            if !send(session, &rendered) {
                dead.push(*id);
            }
        }
        for id in dead {
            sessions.remove(&id);
            warn!(camera = cam_id, session = id, "removed unreachable viewer");
        }
    }

    pub fn session_count(&self, cam_id: &str) -> usize {
        self.sessions().get(cam_id).map_or(0, HashMap::len)
    }
}

fn send(session: &Session, event: &CameraEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(payload) => session.tx.send(payload).is_ok(),
        Err(e) => {
            debug!("event serialization failed: {e}");
            true
        }
    }
}
