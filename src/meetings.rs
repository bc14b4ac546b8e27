use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::err::Error;
use crate::models::{ContactSnapshot, Meeting, SessionLevel, Student};
use crate::roster::RosterManager;
use crate::store::Documents;

const ANIMALS: &[&str] = &["dog", "cat", "dolphin", "snake", "fish", "bird", "lizard"];
const COLORS: &[&str] = &["red", "blue", "green", "yellow", "orange", "purple", "pink"];

/// A colour followed by an animal, e.g. `bluedolphin`.
pub fn generate_password<R: Rng + ?Sized>(rng: &mut R) -> String {
    let color = COLORS.choose(rng).copied().unwrap_or("red");
    let animal = ANIMALS.choose(rng).copied().unwrap_or("cat");
    format!("{}{}", color, animal)
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeetingDetails {
    pub date_and_time: DateTime<Utc>,
    pub duration: u32,
    pub zoom_link: String,
    pub session_level: SessionLevel,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub miro_link: Option<String>,
    #[serde(default)]
    pub coordinator_notes: Option<String>,
    #[serde(default)]
    pub student_notes: Option<String>,
    #[serde(default)]
    pub materials_uploaded: bool,
    #[serde(default)]
    pub materials_object_name: Option<String>,
}

impl MeetingDetails {
    fn validate(&self) -> Result<(), Error> {
        if self.duration == 0 {
            return Err(Error::invalid("`duration` must be at least one minute"));
        }
        if self.zoom_link.trim().is_empty() {
            return Err(Error::invalid("`zoom_link` parameter was empty"));
        }
        Ok(())
    }

    fn apply(self, meeting: &mut Meeting) {
        meeting.date_and_time = self.date_and_time;
        meeting.duration = self.duration;
        meeting.zoom_link = self.zoom_link;
        meeting.session_level = self.session_level;
        meeting.topic = self.topic;
        meeting.miro_link = self.miro_link;
        meeting.coordinator_notes = self.coordinator_notes;
        meeting.student_notes = self.student_notes;
        meeting.materials_uploaded = self.materials_uploaded;
        meeting.materials_object_name = self.materials_object_name;
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMeeting {
    pub meeting_id: Uuid,
    #[serde(flatten)]
    pub details: MeetingDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeetingSearch {
    #[serde(default)]
    pub session_levels: Option<Vec<SessionLevel>>,
    #[serde(default)]
    pub dates: Option<Vec<NaiveDate>>,
}

impl MeetingSearch {
    fn matches(&self, meeting: &Meeting) -> bool {
        let level_ok = self
            .session_levels
            .as_ref()
            .map_or(true, |levels| levels.contains(&meeting.session_level));
        let date_ok = self
            .dates
            .as_ref()
            .map_or(true, |dates| dates.contains(&meeting.date_and_time.date_naive()));
        level_ok && date_ok
    }
}

pub async fn create(docs: &Documents, details: MeetingDetails) -> Result<Meeting, Error> {
    details.validate()?;
    let password = generate_password(&mut rand::thread_rng());
    let mut meeting = Meeting {
        uuid: Uuid::new_v4(),
        date_and_time: details.date_and_time,
        duration: details.duration,
        zoom_link: String::new(),
        miro_link: None,
        topic: None,
        session_level: details.session_level,
        password,
        coordinator_notes: None,
        student_notes: None,
        materials_uploaded: false,
        materials_object_name: None,
        roster: Vec::new(),
    };
    details.apply(&mut meeting);
    docs.save(&meeting).await?;
    log::info!("meeting {} created for {:?}", meeting.uuid, meeting.session_level);
    Ok(meeting)
}

pub async fn update(roster: &RosterManager, update: UpdateMeeting) -> Result<Meeting, Error> {
    update.details.validate()?;
    let details = update.details;
    roster
        .edit_meeting(update.meeting_id, move |meeting| details.apply(meeting))
        .await
}

/// Matching meetings ordered by start time.
pub async fn search(docs: &Documents, filter: &MeetingSearch) -> Result<Vec<Meeting>, Error> {
    let mut meetings: Vec<Meeting> = docs
        .all::<Meeting>()
        .await?
        .into_iter()
        .filter(|m| filter.matches(m))
        .collect();
    meetings.sort_by_key(|m| m.date_and_time);
    Ok(meetings)
}

/// Whether one of the caller's students is on a meeting's roster.
#[derive(Debug, Clone, Serialize)]
pub struct StudentRegistration {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub registered: bool,
}

/// What a family sees: no password, no roster.
#[derive(Debug, Clone, Serialize)]
pub struct StudentMeetingView {
    pub uuid: Uuid,
    pub date_and_time: DateTime<Utc>,
    pub duration: u32,
    pub zoom_link: String,
    pub miro_link: Option<String>,
    pub topic: Option<String>,
    pub session_level: SessionLevel,
    pub student_notes: Option<String>,
    pub materials_uploaded: bool,
    pub registrations: Vec<StudentRegistration>,
}

impl StudentMeetingView {
    pub fn new(meeting: &Meeting, students: &[Student]) -> Self {
        Self {
            uuid: meeting.uuid,
            date_and_time: meeting.date_and_time,
            duration: meeting.duration,
            zoom_link: meeting.zoom_link.clone(),
            miro_link: meeting.miro_link.clone(),
            topic: meeting.topic.clone(),
            session_level: meeting.session_level,
            student_notes: meeting.student_notes.clone(),
            materials_uploaded: meeting.materials_uploaded,
            registrations: students
                .iter()
                .map(|s| StudentRegistration {
                    id: s.id,
                    first_name: s.first_name.clone(),
                    last_name: s.last_name.clone(),
                    registered: meeting.is_registered(s.id),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterEntryView {
    pub student_id: Uuid,
    pub attended: bool,
    #[serde(flatten)]
    pub contact: ContactSnapshot,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminMeetingView {
    pub uuid: Uuid,
    pub date_and_time: DateTime<Utc>,
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
    pub students: Vec<RosterEntryView>,
}

impl AdminMeetingView {
    /// Roster entries are enriched with the student's current name; a roster
    /// entry whose student document is gone is kept but left unnamed.
    pub async fn load(docs: &Documents, meeting: Meeting) -> Result<Self, Error> {
        let mut students = Vec::with_capacity(meeting.roster.len());
        for record in meeting.roster {
            let student = docs.find::<Student>(record.student_id).await?;
            if student.is_none() {
                log::warn!(
                    "student {} is on meeting {}'s roster but has no document",
                    record.student_id,
                    meeting.uuid
                );
            }
            students.push(RosterEntryView {
                student_id: record.student_id,
                attended: record.attended,
                contact: record.contact,
                first_name: student.as_ref().map(|s| s.first_name.clone()),
                last_name: student.map(|s| s.last_name),
            });
        }

        Ok(Self {
            uuid: meeting.uuid,
            date_and_time: meeting.date_and_time,
            duration: meeting.duration,
            zoom_link: meeting.zoom_link,
            miro_link: meeting.miro_link,
            topic: meeting.topic,
            session_level: meeting.session_level,
            password: meeting.password,
            coordinator_notes: meeting.coordinator_notes,
            student_notes: meeting.student_notes,
            materials_uploaded: meeting.materials_uploaded,
            materials_object_name: meeting.materials_object_name,
            students,
        })
    }
}
