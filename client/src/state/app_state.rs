use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::mpsc;

use super::error::{StateError, StateResult};

/// Capture lifecycle state
///
/// `Idle -> RequestingPermission -> Capturing -> Stopping -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum CaptureState {
    /// No microphone, no transport
    #[default]
    Idle,

    /// Waiting for the microphone to open and the transport to connect
    RequestingPermission,

    /// Frames are flowing to the transport
    Capturing,

    /// Sentinel sent, device being released
    Stopping,
}

impl CaptureState {
    /// Check if idle
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if a start is in flight
    pub fn is_requesting(&self) -> bool {
        matches!(self, Self::RequestingPermission)
    }

    /// Check if frames are being captured
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    /// Check if teardown is in progress
    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping)
    }

    /// State name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::RequestingPermission => "RequestingPermission",
            Self::Capturing => "Capturing",
            Self::Stopping => "Stopping",
        }
    }
}

/// Holder of the capture state
///
/// Only the capture pipeline transitions it; everything else reads it through
/// [`StateManager::current`] or a subscription.
pub struct StateManager {
    /// Current state (lock-free reads)
    state: ArcSwap<CaptureState>,

    /// Change listeners
    listeners: Mutex<Vec<mpsc::Sender<CaptureState>>>,
}

impl StateManager {
    /// Create a manager in the `Idle` state
    ///
    /// # Examples
    ///
    /// ```
    /// use lumeai_lib::state::StateManager;
    ///
    /// let manager = StateManager::new();
    /// assert!(manager.current().is_idle());
    /// ```
    pub fn new() -> Self {
        Self {
            state: ArcSwap::new(Arc::new(CaptureState::Idle)),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Create a shared manager
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Get the current state
    pub fn current(&self) -> CaptureState {
        **self.state.load()
    }

    /// Move to a new state
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidTransition`] if the move is not part of
    /// the lifecycle.
    ///
    /// # Examples
    ///
    /// ```
    /// use lumeai_lib::state::{CaptureState, StateManager};
    ///
    /// let manager = StateManager::new();
    /// assert!(manager.transition(CaptureState::RequestingPermission).is_ok());
    /// assert!(manager.transition(CaptureState::Stopping).is_err());
    /// ```
    pub fn transition(&self, new_state: CaptureState) -> StateResult<()> {
        let current = self.current();

        if !Self::is_valid_transition(current, new_state) {
            return Err(StateError::InvalidTransition {
                from: current,
                to: new_state,
            });
        }

        tracing::debug!(from = current.name(), to = new_state.name(), "Capture state transition");
        self.state.store(Arc::new(new_state));
        self.notify_listeners(new_state);

        Ok(())
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> mpsc::Receiver<CaptureState> {
        let (tx, rx) = mpsc::channel(32);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(tx);
        }
        rx
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .map(|mut listeners| {
                listeners.retain(|tx| !tx.is_closed());
                listeners.len()
            })
            .unwrap_or(0)
    }

    /// Force the state back to `Idle` without validation
    pub fn reset(&self) {
        self.state.store(Arc::new(CaptureState::Idle));
        self.notify_listeners(CaptureState::Idle);
    }

    fn notify_listeners(&self, new_state: CaptureState) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|tx| !tx.is_closed());
            for listener in listeners.iter() {
                // A slow listener misses updates rather than stalling capture
                let _ = listener.try_send(new_state);
            }
        }
    }

    fn is_valid_transition(from: CaptureState, to: CaptureState) -> bool {
        use CaptureState::*;

        matches!(
            (from, to),
            (Idle, RequestingPermission)
                | (RequestingPermission, Capturing)
                | (RequestingPermission, Idle)
                | (Capturing, Stopping)
                | (Capturing, Idle)
                | (Stopping, Idle)
        )
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let manager = StateManager::new();

        assert!(manager.transition(CaptureState::RequestingPermission).is_ok());
        assert!(manager.transition(CaptureState::Capturing).is_ok());
        assert!(manager.transition(CaptureState::Stopping).is_ok());
        assert!(manager.transition(CaptureState::Idle).is_ok());
        assert!(manager.current().is_idle());
    }

    #[test]
    fn test_invalid_transitions() {
        let manager = StateManager::new();

        let result = manager.transition(CaptureState::Capturing);
        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));
        assert!(manager.transition(CaptureState::Stopping).is_err());
        assert!(manager.transition(CaptureState::Idle).is_err());

        manager.transition(CaptureState::RequestingPermission).unwrap();
        assert!(manager.transition(CaptureState::Stopping).is_err());
    }

    #[test]
    fn test_permission_refusal_returns_to_idle() {
        let manager = StateManager::new();
        manager.transition(CaptureState::RequestingPermission).unwrap();
        assert!(manager.transition(CaptureState::Idle).is_ok());
    }

    #[test]
    fn test_transport_loss_returns_to_idle() {
        let manager = StateManager::new();
        manager.transition(CaptureState::RequestingPermission).unwrap();
        manager.transition(CaptureState::Capturing).unwrap();
        assert!(manager.transition(CaptureState::Idle).is_ok());
    }

    #[test]
    fn test_reset() {
        let manager = StateManager::new();
        manager.transition(CaptureState::RequestingPermission).unwrap();
        manager.reset();
        assert!(manager.current().is_idle());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(CaptureState::Idle.name(), "Idle");
        assert_eq!(CaptureState::Capturing.name(), "Capturing");
        assert!(CaptureState::Stopping.is_stopping());
        assert!(CaptureState::RequestingPermission.is_requesting());
        assert_eq!(CaptureState::default(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_listener_receives_changes() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager.transition(CaptureState::RequestingPermission).unwrap();
        manager.transition(CaptureState::Capturing).unwrap();

        assert_eq!(rx.recv().await, Some(CaptureState::RequestingPermission));
        assert_eq!(rx.recv().await, Some(CaptureState::Capturing));
    }

    #[test]
    fn test_listener_count() {
        let manager = StateManager::new();
        assert_eq!(manager.listener_count(), 0);

        let rx1 = manager.subscribe();
        let _rx2 = manager.subscribe();
        assert_eq!(manager.listener_count(), 2);

        drop(rx1);
        assert_eq!(manager.listener_count(), 1);
    }
}
