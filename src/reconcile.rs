use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Normalized (asn, courseIdentifier) pair both record sources are matched on.
pub type NaturalKey = (String, String);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasiRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_date: Option<String>,
    /// Fields the engine does not interpret (grade value, work-item flags,
    /// school enrolment, ...) carried verbatim through merge.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummaryRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asn: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordType {
    Linked,
    SummaryOnly,
    PasiOnly,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledRecord {
    pub record_type: RecordType,
    pub match_count: usize,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Summary courseIds arrive as strings or bare numbers depending on which
/// dashboard wrote them. Coerce to string here so key comparison stays
/// strict-equality afterwards.
fn de_opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;
    Ok(match v {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

fn normalize_component(raw: Option<&str>) -> Option<String> {
    let t = raw?.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Single key-construction path shared by the merge and every derived view.
pub fn make_natural_key(asn: Option<&str>, course: Option<&str>) -> Option<NaturalKey> {
    Some((normalize_component(asn)?, normalize_component(course)?))
}

impl PasiRecord {
    pub fn natural_key(&self) -> Option<NaturalKey> {
        make_natural_key(self.asn.as_deref(), self.course_code.as_deref())
    }

    fn fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

impl StudentSummaryRecord {
    pub fn natural_key(&self) -> Option<NaturalKey> {
        make_natural_key(self.asn.as_deref(), self.course_id.as_deref())
    }

    fn fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

fn parse_record_date(raw: Option<&str>) -> Option<NaiveDate> {
    // Accept bare dates or datetime strings with a date prefix.
    let head = raw?.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn date_rank(record: &PasiRecord) -> (Option<NaiveDate>, Option<NaiveDate>) {
    (
        parse_record_date(record.exit_date.as_deref()),
        parse_record_date(record.assignment_date.as_deref()),
    )
}

fn latest_by_dates<'a>(group: &[&'a PasiRecord]) -> &'a PasiRecord {
    debug_assert!(!group.is_empty(), "latest selection needs candidates");
    if group.len() == 1 {
        return group[0];
    }
    let mut best = group[0];
    let mut best_rank = date_rank(best);
    for &candidate in &group[1..] {
        let rank = date_rank(candidate);
        // Strictly-greater keeps the earliest input record on full ties.
        if rank > best_rank {
            best = candidate;
            best_rank = rank;
        }
    }
    best
}

/// Pick the one PASI record that contributes merge fields when several share
/// a natural key: latest exitDate wins, missing exitDate sorts earliest;
/// ties fall to latest assignmentDate, then to input order.
///
/// Calling this with an empty group is a precondition violation.
pub fn latest_pasi_record(group: &[PasiRecord]) -> &PasiRecord {
    latest_by_dates(&group.iter().collect::<Vec<_>>())
}

/// Key-based merge of the two collections.
///
/// Output order is every summary-derived record in summary input order,
/// then every leftover PASI-derived record in PASI input order. Callers
/// wanting a different order sort the result themselves.
pub fn reconcile(
    pasi_records: &[PasiRecord],
    summaries: &[StudentSummaryRecord],
) -> Vec<ReconciledRecord> {
    let mut pasi_groups: HashMap<NaturalKey, Vec<&PasiRecord>> = HashMap::new();
    for p in pasi_records {
        if let Some(key) = p.natural_key() {
            pasi_groups.entry(key).or_default().push(p);
        }
    }

    let mut out = Vec::with_capacity(summaries.len());
    let mut consumed: HashSet<NaturalKey> = HashSet::new();

    for summary in summaries {
        // A key links at most once. Removing the group here means a later
        // summary sharing the key falls through to summaryOnly instead of
        // merging the same PASI record twice.
        let group = summary
            .natural_key()
            .and_then(|key| pasi_groups.remove(&key).map(|g| (key, g)));
        let Some((key, group)) = group else {
            out.push(ReconciledRecord {
                record_type: RecordType::SummaryOnly,
                match_count: 0,
                fields: summary.fields(),
            });
            continue;
        };

        let latest = latest_by_dates(&group);
        let mut fields = latest.fields();
        // The summary's own id wins the overlay; keep the consumed PASI
        // record reachable for update targeting.
        fields.insert("pasiRecordId".to_string(), Value::String(latest.id.clone()));
        for (k, v) in summary.fields() {
            fields.insert(k, v);
        }
        out.push(ReconciledRecord {
            record_type: RecordType::Linked,
            match_count: group.len(),
            fields,
        });
        consumed.insert(key);
    }

    // Incomplete-key records were never grouped; grouped keys no summary
    // claimed stay unconsumed. Both surface here, one output per record.
    for p in pasi_records {
        let leftover = match p.natural_key() {
            None => true,
            Some(key) => !consumed.contains(&key),
        };
        if leftover {
            out.push(ReconciledRecord {
                record_type: RecordType::PasiOnly,
                match_count: 1,
                fields: p.fields(),
            });
        }
    }

    out
}

pub fn unlinked_pasi<'a>(
    pasi_records: &'a [PasiRecord],
    summaries: &[StudentSummaryRecord],
) -> Vec<&'a PasiRecord> {
    let summary_keys: HashSet<NaturalKey> =
        summaries.iter().filter_map(|s| s.natural_key()).collect();
    pasi_records
        .iter()
        .filter(|p| match p.natural_key() {
            None => true,
            Some(key) => !summary_keys.contains(&key),
        })
        .collect()
}

pub fn unmatched_summaries<'a>(
    pasi_records: &[PasiRecord],
    summaries: &'a [StudentSummaryRecord],
) -> Vec<&'a StudentSummaryRecord> {
    let pasi_keys: HashSet<NaturalKey> = pasi_records
        .iter()
        .filter_map(|p| p.natural_key())
        .collect();
    summaries
        .iter()
        .filter(|s| match s.natural_key() {
            None => true,
            Some(key) => !pasi_keys.contains(&key),
        })
        .collect()
}

/// Summaries whose ASN maps to more than one distinct email: the same
/// student enrolled under two accounts, a data-quality signal for the
/// dashboard. Records missing either field cannot be judged and are
/// excluded outright.
pub fn duplicate_asn_summaries(summaries: &[StudentSummaryRecord]) -> Vec<&StudentSummaryRecord> {
    let mut emails_by_asn: HashMap<String, HashSet<String>> = HashMap::new();
    for s in summaries {
        let Some(asn) = normalize_component(s.asn.as_deref()) else {
            continue;
        };
        let Some(email) = normalize_component(s.email.as_deref()) else {
            continue;
        };
        emails_by_asn
            .entry(asn)
            .or_default()
            .insert(email.to_ascii_lowercase());
    }

    summaries
        .iter()
        .filter(|s| {
            let Some(asn) = normalize_component(s.asn.as_deref()) else {
                return false;
            };
            if normalize_component(s.email.as_deref()).is_none() {
                return false;
            }
            emails_by_asn.get(&asn).map(|e| e.len() > 1).unwrap_or(false)
        })
        .collect()
}

/// The two input collections for one query window. When adjacent school
/// years are included their records are concatenated here *before*
/// reconciliation runs, so a record from year N and one from year N+1 that
/// share a natural key will match each other. That loose-year matching is
/// deliberate; dashboards rely on it for mid-year transfers.
#[derive(Debug, Clone, Default)]
pub struct RecordSets {
    pub pasi_records: Vec<PasiRecord>,
    pub summaries: Vec<StudentSummaryRecord>,
}

impl RecordSets {
    pub fn extend(&mut self, other: RecordSets) {
        self.pasi_records.extend(other.pasi_records);
        self.summaries.extend(other.summaries);
    }

    pub fn combined(&self) -> Vec<ReconciledRecord> {
        reconcile(&self.pasi_records, &self.summaries)
    }

    pub fn unlinked_pasi(&self) -> Vec<&PasiRecord> {
        unlinked_pasi(&self.pasi_records, &self.summaries)
    }

    pub fn unmatched_summaries(&self) -> Vec<&StudentSummaryRecord> {
        unmatched_summaries(&self.pasi_records, &self.summaries)
    }

    pub fn duplicate_asn_summaries(&self) -> Vec<&StudentSummaryRecord> {
        duplicate_asn_summaries(&self.summaries)
    }
}
