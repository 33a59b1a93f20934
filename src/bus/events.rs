//! Shared event-name catalogue
//!
//! The bus accepts any string; these are the names the core itself emits or
//! listens to. Per-kind change events come from each store's definition.

/// Generic failure notification published by stores
pub const ERROR: &str = "error";

/// Application start; stores reset and retrieve
pub const STARTUP: &str = "startup";

/// Subject logged in; stores reset and retrieve
pub const LOGIN: &str = "login";

/// Subject logged out; stores reset and retrieve the anonymous view
pub const LOGOUT: &str = "logout";

/// Transport reconnected; stores retrieve without resetting
pub const RECONNECT: &str = "reconnect";

/// Session lifecycle notifications every store reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Application start
    Startup,
    /// Subject logged in
    Login,
    /// Subject logged out
    Logout,
    /// Transport reconnected
    Reconnect,
}

impl LifecycleEvent {
    /// All lifecycle events
    pub const ALL: [LifecycleEvent; 4] = [
        LifecycleEvent::Startup,
        LifecycleEvent::Login,
        LifecycleEvent::Logout,
        LifecycleEvent::Reconnect,
    ];

    /// Bus event name
    pub fn event_name(self) -> &'static str {
        match self {
            LifecycleEvent::Startup => STARTUP,
            LifecycleEvent::Login => LOGIN,
            LifecycleEvent::Logout => LOGOUT,
            LifecycleEvent::Reconnect => RECONNECT,
        }
    }

    /// Whether stores clear their cache before retrieving
    pub fn resets(self) -> bool {
        !matches!(self, LifecycleEvent::Reconnect)
    }
}
