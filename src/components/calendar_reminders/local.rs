use crate::config::LocalPermission;
use crate::error::{Error, ReminderResult};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Permission state of the local notification facility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    Undetermined,
}

impl From<LocalPermission> for Permission {
    fn from(p: LocalPermission) -> Self {
        match p {
            LocalPermission::Granted => Permission::Granted,
            LocalPermission::Denied => Permission::Denied,
            LocalPermission::Ask => Permission::Undetermined,
        }
    }
}

/// Title and body shown by the host's notification facility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMessage {
    pub title: String,
    pub body: String,
}

/// The host's notification facility
pub trait LocalNotifier: Send + Sync {
    /// Whether there is a notification facility at all
    fn is_available(&self) -> bool;

    fn permission(&self) -> Permission;

    /// Ask for permission without waiting for the answer. `pending` is shown
    /// if the answer is "granted".
    fn request_permission(&self, pending: LocalMessage);

    fn show(&self, message: &LocalMessage) -> ReminderResult<()>;
}

/// Desktop notifications through `notify-rust`
#[derive(Clone)]
pub struct DesktopNotifier {
    app_name: String,
    available: bool,
    permission: Arc<Mutex<Permission>>,
}

impl DesktopNotifier {
    pub fn new(initial: LocalPermission) -> Self {
        Self {
            app_name: "muistuttaja".to_string(),
            available: desktop_session_available(),
            permission: Arc::new(Mutex::new(initial.into())),
        }
    }

    fn set_permission(permission: &Mutex<Permission>, value: Permission) {
        *permission.lock().unwrap_or_else(|e| e.into_inner()) = value;
    }
}

impl LocalNotifier for DesktopNotifier {
    fn is_available(&self) -> bool {
        self.available
    }

    fn permission(&self) -> Permission {
        *self.permission.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn request_permission(&self, pending: LocalMessage) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime to probe desktop notifications on");
            return;
        };

        let notifier = self.clone();
        // Fire and forget: the current dispatch does not wait for the probe
        runtime.spawn_blocking(move || {
            if notifier.permission() != Permission::Undetermined {
                return;
            }

            let granted = probe_notification_service();
            let state = if granted {
                Permission::Granted
            } else {
                Permission::Denied
            };
            Self::set_permission(&notifier.permission, state);
            info!("Desktop notification permission resolved to {:?}", state);

            if granted {
                if let Err(e) = notifier.show(&pending) {
                    warn!("Failed to show pending desktop notification: {}", e);
                }
            }
        });
    }

    fn show(&self, message: &LocalMessage) -> ReminderResult<()> {
        notify_rust::Notification::new()
            .appname(&self.app_name)
            .summary(&message.title)
            .body(&message.body)
            .show()
            .map(|_| ())
            .map_err(|e| Error::LocalNotification(e.to_string()))?;
        debug!("Desktop notification shown: {}", message.title);
        Ok(())
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn desktop_session_available() -> bool {
    std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some()
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn desktop_session_available() -> bool {
    true
}

/// Ask the freedesktop notification server whether it is there
#[cfg(all(unix, not(target_os = "macos")))]
fn probe_notification_service() -> bool {
    notify_rust::get_server_information().is_ok()
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn probe_notification_service() -> bool {
    true
}
