//! Driver inbox and user-facing alerts.

use std::io::Write;
use std::sync::Mutex;

use jamal_core::Notification;
use jamal_store::SharedBackend;
use jamal_sync::NotificationPreferences;
use tracing::{info, warn};

use crate::DispatchError;

#[derive(Clone)]
pub struct NotificationService {
    backend: SharedBackend,
}

impl NotificationService {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    /// Store a message for one driver, or for all drivers when `driver_code` is `None`.
    pub async fn save(
        &self,
        title: &str,
        message: &str,
        driver_code: Option<String>,
    ) -> Result<Notification, DispatchError> {
        let n = self
            .backend
            .insert_notification(Notification::new(title, message, driver_code))
            .await?;
        info!(id = %n.id, broadcast = n.is_broadcast(), "notification saved");
        Ok(n)
    }

    /// The driver's own messages plus broadcasts, newest first.
    pub async fn for_driver(&self, code: &str) -> Result<Vec<Notification>, DispatchError> {
        let mut all = self.backend.list_notifications().await?;
        all.retain(|n| n.is_visible_to(code));
        Ok(all)
    }

    pub async fn mark_read(&self, id: &str) -> Result<(), DispatchError> {
        Ok(self.backend.mark_notification_read(id).await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient message shown to whoever is at the terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(kind: AlertKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
        }
    }

    /// Driver side: a client is waiting.
    pub fn new_ride_request(client_name: &str, destination: &str) -> Self {
        Self::new(
            AlertKind::Info,
            "Nova solicitação de corrida",
            format!("Cliente: {client_name}, Destino: {destination}"),
        )
    }

    pub fn ride_accepted(driver_name: &str, eta_minutes: u32) -> Self {
        Self::new(
            AlertKind::Success,
            "Corrida aceita",
            format!(
                "Sua corrida foi aceita por {driver_name}. Tempo estimado: {eta_minutes} minutos."
            ),
        )
    }

    pub fn ride_requested() -> Self {
        Self::new(
            AlertKind::Info,
            "Solicitação enviada",
            "Sua solicitação foi enviada. Aguarde enquanto buscamos um motorista próximo.",
        )
    }

    pub fn driver_arrived(driver_name: &str) -> Self {
        Self::new(
            AlertKind::Success,
            "Motorista chegou!",
            format!("{driver_name} chegou ao local de embarque."),
        )
    }

    pub fn ride_completed(driver_name: &str) -> Self {
        Self::new(
            AlertKind::Success,
            "Corrida finalizada!",
            format!("Sua corrida com {driver_name} foi finalizada. Por favor, avalie o motorista."),
        )
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, alert: &Alert);
}

/// Prints alerts, ringing the terminal bell when sounds are on.
///
/// Terminals cannot vibrate, so that preference is ignored.
pub struct TerminalNotifier<W = std::io::Stdout> {
    out: Mutex<W>,
    preferences: NotificationPreferences,
}

impl TerminalNotifier {
    pub fn stdout(preferences: NotificationPreferences) -> Self {
        Self::with_writer(std::io::stdout(), preferences)
    }
}

impl<W: Write> TerminalNotifier<W> {
    pub fn with_writer(out: W, preferences: NotificationPreferences) -> Self {
        Self {
            out: Mutex::new(out),
            preferences,
        }
    }

    fn rings(&self) -> bool {
        self.preferences.sounds && self.preferences.volume > 0.0
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> Notifier for TerminalNotifier<W> {
    fn notify(&self, alert: &Alert) {
        let Ok(mut out) = self.out.lock() else {
            warn!("notifier output lock poisoned");
            return;
        };
        let bell = if self.rings() { "\x07" } else { "" };
        let marker = match alert.kind {
            AlertKind::Info => "•",
            AlertKind::Success => "✓",
            AlertKind::Warning => "!",
            AlertKind::Error => "✗",
        };
        if let Err(e) = writeln!(out, "{bell}{marker} {}: {}", alert.title, alert.message) {
            warn!(error = %e, "could not write alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use jamal_store::MemoryStore;

    #[tokio::test]
    async fn driver_sees_own_and_broadcast_messages() {
        let service = NotificationService::new(Arc::new(MemoryStore::new()));
        service.save("Aviso", "para todos", None).await.unwrap();
        let own = service
            .save("Pagamento", "liberado", Some("1234".into()))
            .await
            .unwrap();
        service
            .save("Outro", "não é seu", Some("5678".into()))
            .await
            .unwrap();

        let inbox = service.for_driver("1234").await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].id, own.id);

        service.mark_read(&own.id).await.unwrap();
        let inbox = service.for_driver("1234").await.unwrap();
        assert!(inbox[0].read);
    }

    #[test]
    fn bell_follows_preferences() {
        let alert = Alert::driver_arrived("Carlos");
        let loud = TerminalNotifier::with_writer(Vec::new(), NotificationPreferences::default());
        loud.notify(&alert);
        let text = String::from_utf8(loud.into_inner()).unwrap();
        assert!(text.starts_with('\x07'));
        assert!(text.contains("Carlos chegou ao local de embarque."));

        let mut prefs = NotificationPreferences::default();
        prefs.sounds = false;
        let quiet = TerminalNotifier::with_writer(Vec::new(), prefs);
        quiet.notify(&Alert::ride_requested());
        assert!(!String::from_utf8(quiet.into_inner()).unwrap().contains('\x07'));

        let mut muted = NotificationPreferences::default();
        muted.set_volume(0.0);
        let silent = TerminalNotifier::with_writer(Vec::new(), muted);
        silent.notify(&Alert::ride_accepted("Ana", 7));
        let text = String::from_utf8(silent.into_inner()).unwrap();
        assert!(!text.contains('\x07'));
        assert!(text.contains("Tempo estimado: 7 minutos."));
    }
}
