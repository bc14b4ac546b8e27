use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Document, DocumentKind};

/// Bucket used for meetings and per-student counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionLevel {
    JuniorA,
    JuniorB,
    Senior,
}

impl SessionLevel {
    pub const ALL: [SessionLevel; 3] = [
        SessionLevel::JuniorA,
        SessionLevel::JuniorB,
        SessionLevel::Senior,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    PreK,
    K,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "11")]
    Eleven,
    #[serde(rename = "12")]
    Twelve,
}

/// Registered/attended totals for one session level.
///
/// Signed on purpose: under the compatibility policy an unregister of a
/// student without a matching registration may push `registered` below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingCounter {
    pub registered: i64,
    pub attended: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
}

/// Guardian contact info copied into a roster record when the student registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSnapshot {
    pub account_uuid: Uuid,
    pub email: String,
    pub guardians: Vec<Guardian>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub student_id: Uuid,
    pub attended: bool,
    pub contact: ContactSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub profile_uuid: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub grade: Grade,
    pub birth_month: Option<u8>,
    pub birth_year: Option<u16>,
    pub verification_status: bool,
    pub consent_form_object_name: Option<String>,
    /// meeting id -> attended
    pub meetings_registered: BTreeMap<Uuid, bool>,
    pub meeting_counts: BTreeMap<SessionLevel, MeetingCounter>,
}

impl Student {
    pub fn new(profile_uuid: Uuid, details: StudentDetails) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile_uuid,
            first_name: details.first_name,
            last_name: details.last_name,
            grade: details.grade,
            birth_month: details.birth_month,
            birth_year: details.birth_year,
            verification_status: false,
            consent_form_object_name: details.consent_form_object_name,
            meetings_registered: BTreeMap::new(),
            meeting_counts: SessionLevel::ALL
                .iter()
                .map(|level| (*level, MeetingCounter::default()))
                .collect(),
        }
    }

    pub fn counter(&self, level: SessionLevel) -> MeetingCounter {
        self.meeting_counts.get(&level).copied().unwrap_or_default()
    }

    pub fn counter_mut(&mut self, level: SessionLevel) -> &mut MeetingCounter {
        self.meeting_counts.entry(level).or_default()
    }

    pub fn apply_details(&mut self, details: StudentDetails) {
        self.first_name = details.first_name;
        self.last_name = details.last_name;
        self.grade = details.grade;
        self.birth_month = details.birth_month;
        self.birth_year = details.birth_year;
        self.consent_form_object_name = details.consent_form_object_name;
    }
}

impl Document for Student {
    const KIND: DocumentKind = DocumentKind::Student;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// The fields a guardian may set on a student.
#[derive(Debug, Clone, Deserialize)]
pub struct StudentDetails {
    pub first_name: String,
    pub last_name: String,
    pub grade: Grade,
    #[serde(default)]
    pub birth_month: Option<u8>,
    #[serde(default)]
    pub birth_year: Option<u16>,
    #[serde(default)]
    pub consent_form_object_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub uuid: Uuid,
    pub date_and_time: DateTime<Utc>,
    /// Minutes.
    pub duration: u32,
    pub zoom_link: String,
    pub miro_link: Option<String>,
    pub topic: Option<String>,
    pub session_level: SessionLevel,
    pub password: String,
    pub coordinator_notes: Option<String>,
    pub student_notes: Option<String>,
    pub materials_uploaded: bool,
    pub materials_object_name: Option<String>,
    pub roster: Vec<RegistrationRecord>,
}

impl Meeting {
    /// Index of the first roster record for `student_id`.
    pub fn roster_index(&self, student_id: Uuid) -> Option<usize> {
        self.roster.iter().position(|r| r.student_id == student_id)
    }

    pub fn is_registered(&self, student_id: Uuid) -> bool {
        self.roster_index(student_id).is_some()
    }
}

impl Document for Meeting {
    const KIND: DocumentKind = DocumentKind::Meeting;

    fn id(&self) -> Uuid {
        self.uuid
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    /// Same as the owning account's uuid.
    pub uuid: Uuid,
    pub email: String,
    pub students: Vec<Uuid>,
    pub guardians: Vec<Guardian>,
    pub mailing_lists: Vec<SessionLevel>,
}

impl StudentProfile {
    pub fn contact_snapshot(&self) -> ContactSnapshot {
        ContactSnapshot {
            account_uuid: self.uuid,
            email: self.email.clone(),
            guardians: self.guardians.clone(),
        }
    }
}

impl Document for StudentProfile {
    const KIND: DocumentKind = DocumentKind::Profile;

    fn id(&self) -> Uuid {
        self.uuid
    }
}
