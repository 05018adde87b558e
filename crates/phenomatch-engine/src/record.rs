//! Persisted match records.
//!
//! A [`MatchRecord`] is the stored summary of one discovered pair: who was
//! matched on which server, the score triple, a frozen snapshot of both
//! patients' details, and the review state clinicians attach to it (status,
//! comments, notes, notification history).
//!
//! Records cross the persistence boundary as [`StorageRow`]s whose blobs are
//! JSON strings. Blobs that fail to parse are logged and treated as absent.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};

use phenomatch_types::{Disorder, MatchStatus, Patient};

use crate::similarity::SimilarityResult;

/// Maximum stored length of patient and server ids.
pub const MAX_ID_LENGTH: usize = 255;
/// Maximum stored length of a remote record link.
pub const MAX_HREF_LENGTH: usize = 2048;
/// Tolerance when comparing stored scores.
pub const SCORE_EPSILON: f64 = 1e-7;

const FOUND_DATE_FORMAT: &str = "%Y-%m-%d";
const COMMENT_DATE_FORMAT: &str = "%Y/%m/%d %H:%M";

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// A phenotype as recorded in a details snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFeature {
    /// Term id; empty for free-text entries.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Label.
    #[serde(default)]
    pub name: String,
}

/// Present phenotypes, split into coded and free-text entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhenotypeSnapshot {
    /// Coded ontology terms.
    #[serde(default)]
    pub predefined: Vec<SnapshotFeature>,
    /// Free-text entries.
    #[serde(default, rename = "freeText")]
    pub free_text: Vec<SnapshotFeature>,
}

/// Frozen copy of one side's patient data at discovery time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientDetails {
    /// Candidate genes.
    #[serde(default)]
    pub genes: BTreeSet<String>,
    /// Matched genes supported only by exome evidence.
    #[serde(
        default,
        rename = "matchedExomeGenes",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub matched_exome_genes: BTreeSet<String>,
    /// Present phenotypes.
    #[serde(default)]
    pub phenotypes: PhenotypeSnapshot,
    /// Mode of inheritance terms.
    #[serde(default)]
    pub mode_of_inheritance: Vec<String>,
    /// Age of onset term.
    #[serde(default)]
    pub age_of_onset: Option<String>,
    /// Contact addresses.
    #[serde(default)]
    pub contact_info: Vec<String>,
    /// Diagnosed disorders.
    #[serde(default)]
    pub disorders: Vec<Disorder>,
}

impl PatientDetails {
    /// Captures a patient's current details.
    ///
    /// `matched_genes` are the genes reported for the pair; those that are not
    /// candidates are kept as exome-only matches when the patient has exome data.
    pub fn capture(patient: &Patient, matched_genes: &BTreeSet<String>, has_exome: bool) -> Self {
        let genes = patient.candidate_genes();
        let matched_exome_genes = if has_exome {
            matched_genes.difference(&genes).cloned().collect()
        } else {
            BTreeSet::new()
        };

        let mut phenotypes = PhenotypeSnapshot::default();
        for feature in patient.present_features() {
            if feature.is_standard() {
                phenotypes.predefined.push(SnapshotFeature {
                    id: feature.id.clone(),
                    name: feature.name.clone(),
                });
            } else {
                phenotypes.free_text.push(SnapshotFeature {
                    id: String::new(),
                    name: if feature.name.is_empty() {
                        feature.id.clone()
                    } else {
                        feature.name.clone()
                    },
                });
            }
        }

        Self {
            genes,
            matched_exome_genes,
            phenotypes,
            mode_of_inheritance: patient.mode_of_inheritance.clone(),
            age_of_onset: patient.age_of_onset.clone(),
            contact_info: patient.contact_emails.clone(),
            disorders: patient.disorders.clone(),
        }
    }
}

/// Who wrote a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// User id.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl UserInfo {
    /// Creates user info.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One entry in a match's comment thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Author.
    pub userinfo: UserInfo,
    /// Comment text.
    pub comment: String,
    /// Formatted `yyyy/MM/dd HH:mm`.
    pub date: String,
}

/// A user's private note on a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Author id.
    pub user: String,
    /// Note text.
    pub note: String,
}

/// Record of notifications sent and whether the users got in touch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationHistory {
    /// Interaction records, oldest first.
    #[serde(default)]
    pub interactions: Vec<Value>,
    /// Set once the users report having contacted each other.
    #[serde(default, rename = "user-contacted")]
    pub user_contacted: bool,
}

impl NotificationHistory {
    /// Parses a history blob, keeping whatever parts are well formed.
    pub fn parse(blob: &str) -> Self {
        let value: Value = match serde_json::from_str(blob) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Malformed notification history, treating as empty: {}", e);
                return Self::default();
            }
        };
        Self {
            interactions: value
                .get("interactions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            user_contacted: value
                .get("user-contacted")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty() && !self.user_contacted
    }
}

/// A discovered match between a reference and a matched patient.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    id: Option<u64>,
    found_timestamp: DateTime<Utc>,
    notified: bool,
    status: MatchStatus,
    reference_patient_id: String,
    reference_server_id: String,
    matched_patient_id: String,
    matched_server_id: String,
    score: f64,
    phenotype_score: f64,
    genotype_score: f64,
    href: String,
    reference_details: Option<PatientDetails>,
    matched_details: Option<PatientDetails>,
    comments: Vec<Comment>,
    notes: Vec<Note>,
    notification_history: NotificationHistory,
    phenotypes_similarity: Value,
    genotype_similarity: Value,
}

impl MatchRecord {
    /// Captures a scored pair. An empty server id means local.
    pub fn create(result: &SimilarityResult, reference_server_id: &str, matched_server_id: &str) -> Self {
        let genes = result.genotype.gene_symbols();
        Self {
            id: None,
            found_timestamp: Utc::now(),
            notified: false,
            status: MatchStatus::Uncategorized,
            reference_patient_id: truncate(result.reference_id(), MAX_ID_LENGTH),
            reference_server_id: truncate(reference_server_id, MAX_ID_LENGTH),
            matched_patient_id: truncate(result.matched_id(), MAX_ID_LENGTH),
            matched_server_id: truncate(matched_server_id, MAX_ID_LENGTH),
            score: result.score(),
            phenotype_score: result.phenotype_score(),
            genotype_score: result.genotype_score(),
            href: String::new(),
            reference_details: Some(PatientDetails::capture(
                &result.reference,
                &genes,
                result.genotype.reference_has_exome,
            )),
            matched_details: Some(PatientDetails::capture(
                &result.matched,
                &genes,
                result.genotype.match_has_exome,
            )),
            comments: Vec::new(),
            notes: Vec::new(),
            notification_history: NotificationHistory::default(),
            phenotypes_similarity: result.phenotype.clusters_json(),
            genotype_similarity: crate::genotype::genes_json(&result.genotype),
        }
    }

    /// Sets the link to the remote record.
    pub fn with_href(mut self, href: &str) -> Self {
        self.href = truncate(href, MAX_HREF_LENGTH);
        self
    }

    // Identity

    /// Store-assigned id.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Sets the store-assigned id.
    pub fn set_id(&mut self, id: u64) {
        self.id = Some(id);
    }

    /// Reference patient id.
    pub fn reference_patient_id(&self) -> &str {
        &self.reference_patient_id
    }

    /// Reference server id, empty when local.
    pub fn reference_server_id(&self) -> &str {
        &self.reference_server_id
    }

    /// Matched patient id.
    pub fn matched_patient_id(&self) -> &str {
        &self.matched_patient_id
    }

    /// Matched server id, empty when local.
    pub fn matched_server_id(&self) -> &str {
        &self.matched_server_id
    }

    /// Returns true if both patients are local.
    pub fn is_local(&self) -> bool {
        self.reference_server_id.is_empty() && self.matched_server_id.is_empty()
    }

    /// Returns true if a remote patient was matched against a local one.
    pub fn is_incoming(&self) -> bool {
        !self.reference_server_id.is_empty() && self.matched_server_id.is_empty()
    }

    /// Returns true if a local patient was matched against a remote one.
    pub fn is_outgoing(&self) -> bool {
        self.reference_server_id.is_empty() && !self.matched_server_id.is_empty()
    }

    /// Returns true if the given patient is the reference side.
    pub fn is_reference(&self, patient_id: &str, server_id: &str) -> bool {
        self.reference_patient_id == patient_id && self.reference_server_id == server_id
    }

    /// Returns true if the given patient is the matched side.
    pub fn is_matched(&self, patient_id: &str, server_id: &str) -> bool {
        self.matched_patient_id == patient_id && self.matched_server_id == server_id
    }

    /// Local patient ids on either side.
    pub fn local_patient_ids(&self) -> Vec<&str> {
        let mut ids = Vec::with_capacity(2);
        if self.reference_server_id.is_empty() {
            ids.push(self.reference_patient_id.as_str());
        }
        if self.matched_server_id.is_empty() && self.matched_patient_id != self.reference_patient_id {
            ids.push(self.matched_patient_id.as_str());
        }
        ids
    }

    // Scores

    /// Overall score.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Phenotype score.
    pub fn phenotype_score(&self) -> f64 {
        self.phenotype_score
    }

    /// Genotype score.
    pub fn genotype_score(&self) -> f64 {
        self.genotype_score
    }

    /// Link to the remote record, empty for local matches.
    pub fn href(&self) -> &str {
        if self.is_local() {
            ""
        } else {
            &self.href
        }
    }

    /// Reference side snapshot, `None` if it could not be read back.
    pub fn reference_details(&self) -> Option<&PatientDetails> {
        self.reference_details.as_ref()
    }

    /// Matched side snapshot, `None` if it could not be read back.
    pub fn matched_details(&self) -> Option<&PatientDetails> {
        self.matched_details.as_ref()
    }

    // Review state

    /// When the pair was first found.
    pub fn found_timestamp(&self) -> DateTime<Utc> {
        self.found_timestamp
    }

    /// Overrides the found timestamp.
    pub fn set_found_timestamp(&mut self, timestamp: DateTime<Utc>) {
        self.found_timestamp = timestamp;
    }

    /// Review status.
    pub fn status(&self) -> MatchStatus {
        self.status
    }

    /// Sets the review status. Any transition is allowed.
    pub fn set_status(&mut self, status: MatchStatus) {
        self.status = status;
    }

    /// Returns true once notifications went out.
    pub fn is_notified(&self) -> bool {
        self.notified
    }

    /// Marks notifications as sent.
    pub fn set_notified(&mut self, notified: bool) {
        self.notified = notified;
    }

    /// Comment thread, oldest first.
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Appends a comment stamped with the current time.
    pub fn add_comment(&mut self, user: &UserInfo, comment: &str) {
        self.comments.push(Comment {
            userinfo: user.clone(),
            comment: comment.to_string(),
            date: Utc::now().format(COMMENT_DATE_FORMAT).to_string(),
        });
    }

    /// All notes.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// A user's note.
    pub fn notes_for(&self, user: &str) -> Option<&str> {
        self.notes
            .iter()
            .find(|n| n.user == user)
            .map(|n| n.note.as_str())
    }

    /// Sets a user's note, replacing any earlier one.
    pub fn set_note(&mut self, user: &str, note: &str) {
        match self.notes.iter_mut().find(|n| n.user == user) {
            Some(existing) => existing.note = note.to_string(),
            None => self.notes.push(Note {
                user: user.to_string(),
                note: note.to_string(),
            }),
        }
    }

    /// Notification history.
    pub fn notification_history(&self) -> &NotificationHistory {
        &self.notification_history
    }

    /// Appends an interaction record.
    pub fn update_notification_history(&mut self, interaction: Value) {
        self.notification_history.interactions.push(interaction);
    }

    /// Records whether the users contacted each other.
    pub fn set_user_contacted(&mut self, contacted: bool) {
        self.notification_history.user_contacted = contacted;
    }

    /// Returns true if the users reported contact.
    pub fn is_user_contacted(&self) -> bool {
        self.notification_history.user_contacted
    }

    /// Carries review state over from an earlier version of the same pair.
    pub fn preserve_meta_from(&mut self, earlier: &MatchRecord) {
        self.found_timestamp = earlier.found_timestamp;
        self.status = earlier.status;
        self.comments = earlier.comments.clone();
        self.notification_history = earlier.notification_history.clone();
        self.notes = earlier.notes.clone();
    }

    // Pair identity

    /// Stores a local pair with the lexicographically smaller id as reference.
    pub fn canonicalize(&mut self) {
        if self.is_local() && self.reference_patient_id > self.matched_patient_id {
            std::mem::swap(&mut self.reference_patient_id, &mut self.matched_patient_id);
            std::mem::swap(&mut self.reference_server_id, &mut self.matched_server_id);
            std::mem::swap(&mut self.reference_details, &mut self.matched_details);
            swap_sides(&mut self.phenotypes_similarity);
            swap_sides(&mut self.genotype_similarity);
        }
    }

    /// Returns a canonicalized copy.
    pub fn canonical(&self) -> Self {
        let mut record = self.clone();
        record.canonicalize();
        record
    }

    /// True when this record is the mirror image of `other`.
    pub fn is_equivalent(&self, other: &MatchRecord) -> bool {
        self.reference_patient_id == other.matched_patient_id
            && self.reference_server_id == other.matched_server_id
            && self.matched_patient_id == other.reference_patient_id
            && self.matched_server_id == other.reference_server_id
    }

    /// True when both records describe the same pair in the same orientation.
    pub fn is_same_pair(&self, other: &MatchRecord) -> bool {
        self.is_reference(&other.reference_patient_id, &other.reference_server_id)
            && self.is_matched(&other.matched_patient_id, &other.matched_server_id)
    }

    /// Same pair (either orientation), same scores and same detail snapshots.
    pub fn has_same_match_data(&self, other: &MatchRecord) -> bool {
        self.has_same_match_data_within(other, SCORE_EPSILON)
    }

    /// [`has_same_match_data`](Self::has_same_match_data) with an explicit score tolerance.
    pub fn has_same_match_data_within(&self, other: &MatchRecord, epsilon: f64) -> bool {
        let same_details = if self.is_same_pair(other) {
            self.reference_details == other.reference_details
                && self.matched_details == other.matched_details
        } else if self.is_equivalent(other) {
            self.reference_details == other.matched_details
                && self.matched_details == other.reference_details
        } else {
            return false;
        };

        same_details
            && (self.score - other.score).abs() < epsilon
            && (self.phenotype_score - other.phenotype_score).abs() < epsilon
            && (self.genotype_score - other.genotype_score).abs() < epsilon
    }

    // Serialization

    /// JSON for display. `notes` holds only the viewer's own note.
    pub fn to_json(&self, viewer: Option<&str>) -> Value {
        json!({
            "id": self.id,
            "reference": side_json(&self.reference_patient_id, &self.reference_server_id, self.reference_details.as_ref()),
            "matched": side_json(&self.matched_patient_id, &self.matched_server_id, self.matched_details.as_ref()),
            "foundTimestamp": self.found_timestamp.format(FOUND_DATE_FORMAT).to_string(),
            "status": self.status.as_str(),
            "score": self.score,
            "genotypicScore": self.genotype_score,
            "phenotypicScore": self.phenotype_score,
            "href": self.href(),
            "comments": self.comments,
            "notificationHistory": self.notification_history,
            "notes": viewer.and_then(|v| self.notes_for(v)),
            "phenotypesSimilarity": self.phenotypes_similarity,
            "genotypeSimilarity": self.genotype_similarity,
        })
    }

    /// Flattens the canonical form into a storage row.
    pub fn to_storage_row(&self) -> StorageRow {
        let record = self.canonical();
        StorageRow {
            id: record.id,
            found_timestamp: record.found_timestamp,
            notified: record.notified,
            status: record.status.as_str().to_string(),
            reference_patient_id: record.reference_patient_id,
            reference_server_id: record.reference_server_id,
            matched_patient_id: record.matched_patient_id,
            matched_server_id: record.matched_server_id,
            score: record.score,
            phenotype_score: record.phenotype_score,
            genotype_score: record.genotype_score,
            href: record.href,
            reference_details: record.reference_details.as_ref().map(to_blob),
            matched_details: record.matched_details.as_ref().map(to_blob),
            comments: (!record.comments.is_empty()).then(|| to_blob(&record.comments)),
            notes: (!record.notes.is_empty()).then(|| to_blob(&record.notes)),
            notification_history: (!record.notification_history.is_empty())
                .then(|| to_blob(&record.notification_history)),
            phenotypes_similarity: to_blob(&record.phenotypes_similarity),
            genotype_similarity: to_blob(&record.genotype_similarity),
        }
    }

    /// Rebuilds a record from a row. Malformed blobs become empty values.
    pub fn from_storage_row(row: &StorageRow) -> Self {
        let status = MatchStatus::parse(&row.status).unwrap_or_else(|| {
            tracing::warn!("Unknown match status '{}', using uncategorized", row.status);
            MatchStatus::Uncategorized
        });

        Self {
            id: row.id,
            found_timestamp: row.found_timestamp,
            notified: row.notified,
            status,
            reference_patient_id: row.reference_patient_id.clone(),
            reference_server_id: row.reference_server_id.clone(),
            matched_patient_id: row.matched_patient_id.clone(),
            matched_server_id: row.matched_server_id.clone(),
            score: row.score,
            phenotype_score: row.phenotype_score,
            genotype_score: row.genotype_score,
            href: row.href.clone(),
            reference_details: row
                .reference_details
                .as_deref()
                .and_then(|b| from_blob("reference details", b)),
            matched_details: row
                .matched_details
                .as_deref()
                .and_then(|b| from_blob("matched details", b)),
            comments: row
                .comments
                .as_deref()
                .and_then(|b| from_blob("comments", b))
                .unwrap_or_default(),
            notes: row
                .notes
                .as_deref()
                .and_then(|b| from_blob("notes", b))
                .unwrap_or_default(),
            notification_history: row
                .notification_history
                .as_deref()
                .map(NotificationHistory::parse)
                .unwrap_or_default(),
            phenotypes_similarity: from_blob("phenotype similarity", &row.phenotypes_similarity)
                .unwrap_or(Value::Null),
            genotype_similarity: from_blob("genotype similarity", &row.genotype_similarity)
                .unwrap_or(Value::Null),
        }
    }

    /// Copies the record into an immutable history entry.
    pub fn archive_to_history(&self) -> HistoricMatch {
        HistoricMatch {
            row: self.to_storage_row(),
            archived_at: Utc::now(),
        }
    }
}

fn side_json(patient_id: &str, server_id: &str, details: Option<&PatientDetails>) -> Value {
    let mut object = Map::new();
    object.insert("patientId".into(), json!(patient_id));
    object.insert("serverId".into(), json!(server_id));
    if let Some(Value::Object(fields)) = details.and_then(|d| serde_json::to_value(d).ok()) {
        object.extend(fields);
    }
    Value::Object(object)
}

/// Swaps `reference` and `match` in every object of a similarity array.
fn swap_sides(value: &mut Value) {
    if let Value::Array(items) = value {
        for item in items.iter_mut().filter_map(Value::as_object_mut) {
            let reference = item.remove("reference");
            let matched = item.remove("match");
            if let Some(v) = matched {
                item.insert("reference".into(), v);
            }
            if let Some(v) = reference {
                item.insert("match".into(), v);
            }
        }
    }
}

fn to_blob<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!("Could not serialize match blob: {}", e);
        String::new()
    })
}

fn from_blob<T: DeserializeOwned>(what: &str, blob: &str) -> Option<T> {
    match serde_json::from_str(blob) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Malformed {} blob, treating as absent: {}", what, e);
            None
        }
    }
}

/// Flat persisted form of a [`MatchRecord`]; blobs are JSON strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRow {
    /// Store-assigned id.
    pub id: Option<u64>,
    /// When the pair was first found.
    pub found_timestamp: DateTime<Utc>,
    /// Whether notifications went out.
    pub notified: bool,
    /// Status name.
    pub status: String,
    /// Reference patient id.
    pub reference_patient_id: String,
    /// Reference server id.
    pub reference_server_id: String,
    /// Matched patient id.
    pub matched_patient_id: String,
    /// Matched server id.
    pub matched_server_id: String,
    /// Overall score.
    pub score: f64,
    /// Phenotype score.
    pub phenotype_score: f64,
    /// Genotype score.
    pub genotype_score: f64,
    /// Remote link.
    pub href: String,
    /// Reference details blob.
    pub reference_details: Option<String>,
    /// Matched details blob.
    pub matched_details: Option<String>,
    /// Comments blob.
    pub comments: Option<String>,
    /// Notes blob.
    pub notes: Option<String>,
    /// Notification history blob.
    pub notification_history: Option<String>,
    /// Phenotype clusters blob.
    pub phenotypes_similarity: String,
    /// Gene list blob.
    pub genotype_similarity: String,
}

/// An archived, read-only copy of a superseded or removed match.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricMatch {
    row: StorageRow,
    archived_at: DateTime<Utc>,
}

impl HistoricMatch {
    /// Stored fields as they were when archived.
    pub fn row(&self) -> &StorageRow {
        &self.row
    }

    /// When the record was archived.
    pub fn archived_at(&self) -> DateTime<Utc> {
        self.archived_at
    }

    /// Rebuilds the archived record.
    pub fn record(&self) -> MatchRecord {
        MatchRecord::from_storage_row(&self.row)
    }
}
