//! Match notifications.
//!
//! Matches are grouped by local patient; each group becomes one
//! [`PatientMatchEmail`] handed to a [`MatchNotifier`]. Delivery itself is
//! the notifier's business. Successful sends are recorded in each match's
//! notification history.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::context::NotificationEmailResolver;
use crate::error::MatchResult;
use crate::record::MatchRecord;
use crate::storage::MatchStore;

const NOTIFICATION_DATE_FORMAT: &str = "%Y/%m/%d %H:%M";

/// Matches to report to the owners of one local patient.
#[derive(Debug, Clone)]
pub struct PatientMatchEmail {
    /// Local patient the matches were found for.
    pub patient_id: String,
    /// Addresses of the patient's owners.
    pub recipients: Vec<String>,
    /// Matches involving the patient.
    pub matches: Vec<MatchRecord>,
}

/// Outbound channel for match notifications.
pub trait MatchNotifier: Send + Sync {
    /// Delivers one email.
    fn send(&self, email: &PatientMatchEmail) -> MatchResult<()>;
}

/// Per-match outcome of a notification request.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationResponse {
    /// Match id.
    pub match_id: u64,
    /// Local patient whose owners were notified.
    pub patient_id: String,
    /// Whether the notification went out.
    pub success: bool,
    /// Failure description.
    pub message: Option<String>,
}

impl NotificationResponse {
    fn ok(match_id: u64, patient_id: &str) -> Self {
        Self {
            match_id,
            patient_id: patient_id.to_string(),
            success: true,
            message: None,
        }
    }

    fn failed(match_id: u64, patient_id: &str, message: impl Into<String>) -> Self {
        Self {
            match_id,
            patient_id: patient_id.to_string(),
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Sends notifications for stored matches.
pub struct NotificationManager {
    store: Arc<dyn MatchStore>,
    emails: Arc<dyn NotificationEmailResolver>,
    notifier: Arc<dyn MatchNotifier>,
}

impl NotificationManager {
    /// Creates a manager.
    pub fn new(
        store: Arc<dyn MatchStore>,
        emails: Arc<dyn NotificationEmailResolver>,
        notifier: Arc<dyn MatchNotifier>,
    ) -> Self {
        Self {
            store,
            emails,
            notifier,
        }
    }

    /// Builds one email per local patient involved in the given matches.
    pub fn build_emails(&self, matches: Vec<MatchRecord>) -> Vec<PatientMatchEmail> {
        let mut by_patient: BTreeMap<String, Vec<MatchRecord>> = BTreeMap::new();
        for record in matches {
            for patient_id in record.local_patient_ids() {
                by_patient
                    .entry(patient_id.to_string())
                    .or_default()
                    .push(record.clone());
            }
        }

        by_patient
            .into_iter()
            .map(|(patient_id, matches)| PatientMatchEmail {
                recipients: self.emails.get_emails(&patient_id),
                patient_id,
                matches,
            })
            .collect()
    }

    /// Notifies the owners of every local patient in the given matches.
    ///
    /// A local pair produces one response per side.
    pub fn send_notifications(&self, match_ids: &[u64]) -> Vec<NotificationResponse> {
        let matches = self.store.load_matches_by_ids(match_ids);
        let mut responses: Vec<NotificationResponse> = match_ids
            .iter()
            .filter(|id| !matches.iter().any(|m| m.id() == Some(**id)))
            .map(|id| NotificationResponse::failed(*id, "", "Match not found"))
            .collect();

        for email in self.build_emails(matches) {
            let ids: Vec<u64> = email.matches.iter().filter_map(MatchRecord::id).collect();

            if email.recipients.is_empty() {
                tracing::warn!("No contact email for patient {}", email.patient_id);
                responses.extend(ids.iter().map(|id| {
                    NotificationResponse::failed(*id, &email.patient_id, "No contact email")
                }));
                continue;
            }

            if let Err(e) = self.notifier.send(&email) {
                tracing::error!("Notification for patient {} failed: {}", email.patient_id, e);
                let message = e.to_string();
                responses.extend(
                    ids.iter()
                        .map(|id| NotificationResponse::failed(*id, &email.patient_id, message.clone())),
                );
                continue;
            }

            let interaction = json!({
                "type": "notification",
                "to": email.recipients,
                "date": Utc::now().format(NOTIFICATION_DATE_FORMAT).to_string(),
            });
            for id in ids {
                let recorded = self
                    .store
                    .update_notification_history(id, interaction.clone())
                    .and_then(|_| self.store.mark_notified(id));
                responses.push(match recorded {
                    Ok(_) => NotificationResponse::ok(id, &email.patient_id),
                    Err(e) => {
                        tracing::error!("Could not record notification for match {}: {}", id, e);
                        NotificationResponse::failed(id, &email.patient_id, e.to_string())
                    }
                });
            }
            tracing::info!(
                "Notified {} recipients about {} matches for patient {}",
                email.recipients.len(),
                email.matches.len(),
                email.patient_id
            );
        }

        responses
    }
}
