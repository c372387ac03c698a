use std::{collections::HashMap, time::Duration};

use anyhow::{Context, Result};
use tokio::time::timeout;
use tracing::{debug, warn};
use zbus::{Connection, proxy, zvariant::Value};

use crate::reconciler::Outcome;

const APP_NAME: &str = "gpu-tune";
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

// The three messages shown to the desktop user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Success,
    NoOp,
    Failure,
}

impl Notice {
    // Select the notice for the result of a run
    pub fn for_result<T>(result: &std::result::Result<Outcome, T>) -> Self {
        match result {
            Ok(Outcome::Applied) => Notice::Success,
            Ok(Outcome::NoOp) => Notice::NoOp,
            Err(_) => Notice::Failure,
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Notice::Success => "Update Success",
            Notice::NoOp => "NO-OP",
            Notice::Failure => "Update Failed",
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            Notice::Success => "New GPU tune applied",
            Notice::NoOp => "Current GPU state matches target",
            Notice::Failure => "Failed to update GPU state",
        }
    }
}

#[proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications",
    gen_blocking = false
)]
trait Notifications {
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: &HashMap<&str, &Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;
}

// Show the notice on the desktop. The run result never depends on the
// notification, a missing session bus or notification daemon is only
// logged.
pub async fn notify(notice: Notice) {
    match timeout(NOTIFY_TIMEOUT, send(notice)).await {
        Ok(Ok(id)) => debug!("Notification sent, id: {id}"),
        Ok(Err(err)) => {
            warn!("Failed to show desktop notification: {err}");

            err.chain().skip(1).for_each(|e| {
                debug!("Error chain: {}", e);
            });
        }
        Err(_) => warn!("Desktop notification timed out"),
    }
}

async fn send(notice: Notice) -> Result<u32> {
    let connection = Connection::session()
        .await
        .with_context(|| "Failed to connect to the session bus")?;

    let proxy = NotificationsProxy::new(&connection)
        .await
        .with_context(|| "Failed to create notifications proxy")?;

    let id = proxy
        .notify(
            APP_NAME,
            0,
            "",
            notice.summary(),
            notice.body(),
            &[],
            &HashMap::new(),
            -1,
        )
        .await
        .with_context(|| "Notify call failed")?;

    Ok(id)
}
