//! Keeps a meeting's roster and each student's registration ledger and
//! per-level counters in agreement.
//!
//! The free functions [`register`], [`unregister`] and [`mark_attendance`]
//! operate on already-loaded documents and never touch storage. [`RosterManager`]
//! wraps them with locking, loading and persistence.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::err::Error;
use crate::models::{ContactSnapshot, Meeting, MeetingCounter, RegistrationRecord, Student};
use crate::store::Documents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Ok,
    AlreadyRegistered,
    NotRegistered,
}

/// How counters react to unregistration and attendance changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterPolicy {
    /// Unconditional `+1`/`-1` on every attendance update, no floor on
    /// decrements, `attended` untouched by unregister.
    #[default]
    Compat,
    /// Attendance only moves the counter on an actual flag change; counters
    /// never drop below zero and `attended` never exceeds `registered`.
    Strict,
}

impl FromStr for CounterPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compat" => Ok(CounterPolicy::Compat),
            "strict" => Ok(CounterPolicy::Strict),
            other => anyhow::bail!("unknown counter policy `{}` (expected compat or strict)", other),
        }
    }
}

impl CounterPolicy {
    fn registered(self, counter: &mut MeetingCounter) {
        counter.registered += 1;
    }

    fn unregistered(self, counter: &mut MeetingCounter) {
        match self {
            CounterPolicy::Compat => counter.registered -= 1,
            CounterPolicy::Strict => {
                counter.registered = (counter.registered - 1).max(0);
                counter.attended = counter.attended.clamp(0, counter.registered);
            }
        }
    }

    fn attendance(self, counter: &mut MeetingCounter, previous: bool, attended: bool) {
        match self {
            CounterPolicy::Compat => counter.attended += if attended { 1 } else { -1 },
            CounterPolicy::Strict => {
                if previous != attended {
                    counter.attended += if attended { 1 } else { -1 };
                }
                counter.attended = counter.attended.clamp(0, counter.registered.max(0));
            }
        }
    }
}

/// Adds `student` to `meeting`'s roster and ledger.
///
/// Registering twice is a no-op reported as [`Outcome::AlreadyRegistered`].
/// If only one side knows about the registration the other side is filled in;
/// `registered` is only incremented when the ledger entry is new.
pub fn register(meeting: &mut Meeting, student: &mut Student, contact: ContactSnapshot) -> Outcome {
    let in_roster = meeting.is_registered(student.id);
    let in_ledger = student.meetings_registered.contains_key(&meeting.uuid);
    if in_roster && in_ledger {
        return Outcome::AlreadyRegistered;
    }

    if !in_roster {
        meeting.roster.push(RegistrationRecord {
            student_id: student.id,
            attended: false,
            contact,
        });
    }
    if !in_ledger {
        student.meetings_registered.insert(meeting.uuid, false);
        student.counter_mut(meeting.session_level).registered += 1;
    }
    Outcome::Ok
}

/// Removes the first roster record for `student`.
///
/// The `registered` counter is only decremented when the ledger held the
/// meeting. `attended` is left alone except for the clamp under
/// [`CounterPolicy::Strict`].
pub fn unregister(meeting: &mut Meeting, student: &mut Student, policy: CounterPolicy) -> Outcome {
    let Some(index) = meeting.roster_index(student.id) else {
        return Outcome::NotRegistered;
    };
    meeting.roster.remove(index);

    if student.meetings_registered.remove(&meeting.uuid).is_some() {
        policy.unregistered(student.counter_mut(meeting.session_level));
    }
    Outcome::Ok
}

pub fn mark_attendance(
    meeting: &mut Meeting,
    student: &mut Student,
    attended: bool,
    policy: CounterPolicy,
) -> Outcome {
    let Some(index) = meeting.roster_index(student.id) else {
        return Outcome::NotRegistered;
    };
    let record = &mut meeting.roster[index];
    let previous = record.attended;
    record.attended = attended;

    student.meetings_registered.insert(meeting.uuid, attended);
    policy.attendance(student.counter_mut(meeting.session_level), previous, attended);
    Outcome::Ok
}

/// Moves one roster entry's contribution from the meeting's old level bucket
/// to the new one.
fn move_counts(
    student: &mut Student,
    record: &RegistrationRecord,
    from: crate::models::SessionLevel,
    to: crate::models::SessionLevel,
    policy: CounterPolicy,
) {
    if record.attended {
        policy.attendance(student.counter_mut(from), true, false);
    }
    policy.unregistered(student.counter_mut(from));

    let target = student.counter_mut(to);
    policy.registered(target);
    if record.attended {
        policy.attendance(target, false, true);
    }
}

#[derive(Clone, Default)]
struct KeyedLocks {
    table: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    async fn lock(&self, key: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut table = self.table.lock().await;
            // idle slots are only referenced by the table itself
            table.retain(|_, slot| Arc::strong_count(slot) > 1);
            table.entry(key).or_default().clone()
        };
        slot.lock_owned().await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterChange {
    pub outcome: Outcome,
    pub meeting: Meeting,
    pub student: Student,
}

/// Serialises every roster mutation per meeting and per student.
///
/// Locks are always taken meeting first, then student.
#[derive(Clone)]
pub struct RosterManager {
    docs: Documents,
    policy: CounterPolicy,
    meeting_locks: KeyedLocks,
    student_locks: KeyedLocks,
}

impl RosterManager {
    pub fn new(docs: Documents, policy: CounterPolicy) -> Self {
        Self {
            docs,
            policy,
            meeting_locks: KeyedLocks::default(),
            student_locks: KeyedLocks::default(),
        }
    }

    pub fn documents(&self) -> &Documents {
        &self.docs
    }

    pub async fn register(
        &self,
        meeting_id: Uuid,
        student_id: Uuid,
        contact: ContactSnapshot,
    ) -> Result<RosterChange, Error> {
        self.apply(meeting_id, student_id, |meeting, student, _| {
            register(meeting, student, contact)
        })
        .await
    }

    pub async fn unregister(&self, meeting_id: Uuid, student_id: Uuid) -> Result<RosterChange, Error> {
        self.apply(meeting_id, student_id, unregister).await
    }

    pub async fn mark_attendance(
        &self,
        meeting_id: Uuid,
        student_id: Uuid,
        attended: bool,
    ) -> Result<RosterChange, Error> {
        self.apply(meeting_id, student_id, |meeting, student, policy| {
            mark_attendance(meeting, student, attended, policy)
        })
        .await
    }

    async fn apply<F>(&self, meeting_id: Uuid, student_id: Uuid, op: F) -> Result<RosterChange, Error>
    where
        F: FnOnce(&mut Meeting, &mut Student, CounterPolicy) -> Outcome,
    {
        let _meeting_guard = self.meeting_locks.lock(meeting_id).await;
        let _student_guard = self.student_locks.lock(student_id).await;

        let mut meeting = self.docs.load::<Meeting>(meeting_id).await?;
        let mut student = self.docs.load::<Student>(student_id).await?;

        let outcome = op(&mut meeting, &mut student, self.policy);
        log::debug!(
            "roster change meeting={} student={} outcome={:?}",
            meeting_id,
            student_id,
            outcome
        );
        match outcome {
            Outcome::Ok => {
                self.docs.save(&meeting).await?;
                self.docs.save(&student).await?;
            }
            Outcome::NotRegistered => {
                log::warn!("student {} is not registered for meeting {}", student_id, meeting_id)
            }
            Outcome::AlreadyRegistered => {}
        }

        Ok(RosterChange {
            outcome,
            meeting,
            student,
        })
    }

    /// Applies `edit` to a student under its lock. Used for profile fields;
    /// the ledger and counters are only written by the roster operations.
    pub async fn edit_student<F>(&self, student_id: Uuid, edit: F) -> Result<Student, Error>
    where
        F: FnOnce(&mut Student),
    {
        let _student_guard = self.student_locks.lock(student_id).await;
        let mut student = self.docs.load::<Student>(student_id).await?;
        edit(&mut student);
        student.id = student_id;
        self.docs.save(&student).await?;
        Ok(student)
    }

    /// Unregisters `student_id` from every meeting in its ledger.
    pub async fn withdraw_student(&self, student_id: Uuid) -> Result<Student, Error> {
        let student = self.docs.load::<Student>(student_id).await?;
        for meeting_id in student.meetings_registered.keys() {
            match self.unregister(*meeting_id, student_id).await {
                Ok(_) => {}
                Err(Error::NotFound { message }) => {
                    log::warn!("withdrawing student {}: {}", student_id, message)
                }
                Err(err) => return Err(err),
            }
        }
        self.docs.load::<Student>(student_id).await
    }

    /// Withdraws `student_id` from every meeting and deletes its document.
    ///
    /// Registrations that land between the withdrawal and the delete are
    /// picked up by the re-check and withdrawn on the next pass.
    pub async fn remove_student(&self, student_id: Uuid) -> Result<(), Error> {
        loop {
            self.withdraw_student(student_id).await?;
            if self.delete_if_withdrawn(student_id).await? {
                log::info!("student {} removed", student_id);
                return Ok(());
            }
            log::debug!("student {} registered again while being removed", student_id);
        }
    }

    /// Deletes the student under its lock, unless its ledger still lists a
    /// meeting.
    async fn delete_if_withdrawn(&self, student_id: Uuid) -> Result<bool, Error> {
        let _student_guard = self.student_locks.lock(student_id).await;
        let student = self.docs.load::<Student>(student_id).await?;
        if !student.meetings_registered.is_empty() {
            return Ok(false);
        }
        self.docs.delete::<Student>(student_id).await?;
        Ok(true)
    }

    /// Unregisters every rostered student and deletes the meeting.
    pub async fn cancel_meeting(&self, meeting_id: Uuid) -> Result<Meeting, Error> {
        let _meeting_guard = self.meeting_locks.lock(meeting_id).await;
        let mut meeting = self.docs.load::<Meeting>(meeting_id).await?;

        let student_ids: Vec<Uuid> = meeting.roster.iter().map(|r| r.student_id).collect();
        for student_id in student_ids {
            let _student_guard = self.student_locks.lock(student_id).await;
            let Some(mut student) = self.docs.find::<Student>(student_id).await? else {
                log::warn!("meeting {} lists missing student {}", meeting_id, student_id);
                continue;
            };
            if unregister(&mut meeting, &mut student, self.policy) == Outcome::Ok {
                self.docs.save(&student).await?;
            }
        }

        self.docs.delete::<Meeting>(meeting_id).await?;
        log::info!("meeting {} deleted", meeting_id);
        Ok(meeting)
    }

    /// Applies `edit` to a meeting under its lock. A session level change
    /// re-buckets every rostered student's counters.
    ///
    /// Students are saved one at a time before the meeting. If a save fails
    /// partway, retrying the same level change moves the already-saved
    /// students' counts a second time.
    pub async fn edit_meeting<F>(&self, meeting_id: Uuid, edit: F) -> Result<Meeting, Error>
    where
        F: FnOnce(&mut Meeting),
    {
        let _meeting_guard = self.meeting_locks.lock(meeting_id).await;
        let mut meeting = self.docs.load::<Meeting>(meeting_id).await?;
        let old_level = meeting.session_level;
        edit(&mut meeting);
        meeting.uuid = meeting_id;

        if meeting.session_level != old_level {
            for record in &meeting.roster {
                let _student_guard = self.student_locks.lock(record.student_id).await;
                let Some(mut student) = self.docs.find::<Student>(record.student_id).await? else {
                    log::warn!("meeting {} lists missing student {}", meeting_id, record.student_id);
                    continue;
                };
                move_counts(&mut student, record, old_level, meeting.session_level, self.policy);
                self.docs.save(&student).await?;
            }
        }

        self.docs.save(&meeting).await?;
        Ok(meeting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Grade, SessionLevel, StudentDetails};
    use chrono::Utc;

    fn meeting(level: SessionLevel) -> Meeting {
        Meeting {
            uuid: Uuid::new_v4(),
            date_and_time: Utc::now(),
            duration: 60,
            zoom_link: "https://zoom.example/j/1".to_string(),
            miro_link: None,
            topic: Some("Graphs".to_string()),
            session_level: level,
            password: "redcat".to_string(),
            coordinator_notes: None,
            student_notes: None,
            materials_uploaded: false,
            materials_object_name: None,
            roster: Vec::new(),
        }
    }

    fn student() -> Student {
        Student::new(
            Uuid::new_v4(),
            StudentDetails {
                first_name: "Sofia".to_string(),
                last_name: "Kovalevskaya".to_string(),
                grade: Grade::Eight,
                birth_month: None,
                birth_year: None,
                consent_form_object_name: None,
            },
        )
    }

    fn contact() -> ContactSnapshot {
        ContactSnapshot {
            account_uuid: Uuid::new_v4(),
            email: "family@example.com".to_string(),
            guardians: Vec::new(),
        }
    }

    fn counts(registered: i64, attended: i64) -> MeetingCounter {
        MeetingCounter {
            registered,
            attended,
        }
    }

    #[test]
    fn register_twice_keeps_one_roster_entry() {
        let mut m = meeting(SessionLevel::JuniorA);
        let mut s = student();

        assert_eq!(register(&mut m, &mut s, contact()), Outcome::Ok);
        for _ in 0..3 {
            assert_eq!(register(&mut m, &mut s, contact()), Outcome::AlreadyRegistered);
        }

        assert_eq!(m.roster.len(), 1);
        assert_eq!(s.counter(SessionLevel::JuniorA), counts(1, 0));
        assert_eq!(s.meetings_registered.get(&m.uuid), Some(&false));
    }

    #[test]
    fn register_repairs_missing_roster_entry_without_recounting() {
        let mut m = meeting(SessionLevel::Senior);
        let mut s = student();
        register(&mut m, &mut s, contact());
        m.roster.clear();

        assert_eq!(register(&mut m, &mut s, contact()), Outcome::Ok);
        assert_eq!(m.roster.len(), 1);
        assert_eq!(s.counter(SessionLevel::Senior), counts(1, 0));
    }

    #[test]
    fn unregister_undoes_register() {
        let mut m = meeting(SessionLevel::JuniorB);
        let mut s = student();
        let before = s.counter(SessionLevel::JuniorB);

        register(&mut m, &mut s, contact());
        assert_eq!(unregister(&mut m, &mut s, CounterPolicy::Compat), Outcome::Ok);

        assert!(m.roster.is_empty());
        assert!(s.meetings_registered.is_empty());
        assert_eq!(s.counter(SessionLevel::JuniorB), before);
    }

    #[test]
    fn unregister_without_registration_changes_nothing() {
        let mut m = meeting(SessionLevel::JuniorA);
        let mut s = student();
        let other = {
            let mut other = student();
            register(&mut m, &mut other, contact());
            other
        };
        let (m_before, s_before) = (m.clone(), s.clone());

        assert_eq!(unregister(&mut m, &mut s, CounterPolicy::Compat), Outcome::NotRegistered);
        assert_eq!(m, m_before);
        assert_eq!(s, s_before);
        assert!(m.is_registered(other.id));
    }

    #[test]
    fn second_unregister_reports_not_registered() {
        let mut m = meeting(SessionLevel::JuniorA);
        let mut s = student();
        register(&mut m, &mut s, contact());

        assert_eq!(unregister(&mut m, &mut s, CounterPolicy::Compat), Outcome::Ok);
        assert_eq!(unregister(&mut m, &mut s, CounterPolicy::Compat), Outcome::NotRegistered);
        assert_eq!(s.counter(SessionLevel::JuniorA), counts(0, 0));
    }

    #[test]
    fn compat_attendance_counts_every_call() {
        let mut m = meeting(SessionLevel::JuniorA);
        let mut s = student();
        register(&mut m, &mut s, contact());

        mark_attendance(&mut m, &mut s, true, CounterPolicy::Compat);
        assert_eq!(s.counter(SessionLevel::JuniorA), counts(1, 1));
        mark_attendance(&mut m, &mut s, true, CounterPolicy::Compat);
        assert_eq!(s.counter(SessionLevel::JuniorA), counts(1, 2));

        mark_attendance(&mut m, &mut s, false, CounterPolicy::Compat);
        mark_attendance(&mut m, &mut s, false, CounterPolicy::Compat);
        mark_attendance(&mut m, &mut s, false, CounterPolicy::Compat);
        assert_eq!(s.counter(SessionLevel::JuniorA), counts(1, -1));
        assert_eq!(s.meetings_registered.get(&m.uuid), Some(&false));
    }

    #[test]
    fn strict_attendance_only_counts_transitions() {
        let mut m = meeting(SessionLevel::Senior);
        let mut s = student();
        register(&mut m, &mut s, contact());

        mark_attendance(&mut m, &mut s, true, CounterPolicy::Strict);
        mark_attendance(&mut m, &mut s, true, CounterPolicy::Strict);
        assert_eq!(s.counter(SessionLevel::Senior), counts(1, 1));

        mark_attendance(&mut m, &mut s, false, CounterPolicy::Strict);
        mark_attendance(&mut m, &mut s, false, CounterPolicy::Strict);
        assert_eq!(s.counter(SessionLevel::Senior), counts(1, 0));
    }

    #[test]
    fn attendance_for_unregistered_student_is_rejected() {
        let mut m = meeting(SessionLevel::Senior);
        let mut s = student();
        let s_before = s.clone();

        assert_eq!(
            mark_attendance(&mut m, &mut s, true, CounterPolicy::Compat),
            Outcome::NotRegistered
        );
        assert_eq!(s, s_before);
        assert!(m.roster.is_empty());
    }

    #[test]
    fn compat_unregister_can_go_negative() {
        let mut m = meeting(SessionLevel::JuniorA);
        let mut s = student();
        register(&mut m, &mut s, contact());
        s.counter_mut(SessionLevel::JuniorA).registered = 0;

        unregister(&mut m, &mut s, CounterPolicy::Compat);
        assert_eq!(s.counter(SessionLevel::JuniorA).registered, -1);
    }

    #[test]
    fn strict_unregister_saturates_and_clamps_attended() {
        let mut m = meeting(SessionLevel::JuniorA);
        let mut s = student();
        register(&mut m, &mut s, contact());
        mark_attendance(&mut m, &mut s, true, CounterPolicy::Strict);
        s.counter_mut(SessionLevel::JuniorA).registered = 0;

        unregister(&mut m, &mut s, CounterPolicy::Strict);
        assert_eq!(s.counter(SessionLevel::JuniorA), counts(0, 0));
    }

    #[test]
    fn register_attend_unregister_leaves_attended_alone() {
        let mut m = meeting(SessionLevel::JuniorA);
        let mut s = student();

        register(&mut m, &mut s, contact());
        assert_eq!(m.roster.len(), 1);
        assert_eq!(m.roster[0].student_id, s.id);
        assert_eq!(s.counter(SessionLevel::JuniorA), counts(1, 0));

        mark_attendance(&mut m, &mut s, true, CounterPolicy::Compat);
        assert!(m.roster[0].attended);
        assert_eq!(s.counter(SessionLevel::JuniorA), counts(1, 1));

        unregister(&mut m, &mut s, CounterPolicy::Compat);
        assert!(m.roster.is_empty());
        assert_eq!(s.counter(SessionLevel::JuniorA), counts(0, 1));
    }

    #[test]
    fn counter_policy_parses_case_insensitively() {
        assert_eq!("STRICT".parse::<CounterPolicy>().unwrap(), CounterPolicy::Strict);
        assert_eq!("compat".parse::<CounterPolicy>().unwrap(), CounterPolicy::Compat);
        assert!("lenient".parse::<CounterPolicy>().is_err());
    }

    async fn seeded(level: SessionLevel) -> (RosterManager, Meeting, Student) {
        let manager = RosterManager::new(Documents::in_memory(), CounterPolicy::Compat);
        let m = meeting(level);
        let s = student();
        manager.documents().save(&m).await.unwrap();
        manager.documents().save(&s).await.unwrap();
        (manager, m, s)
    }

    #[tokio::test]
    async fn manager_persists_both_documents() {
        let (manager, m, s) = seeded(SessionLevel::JuniorA).await;

        let change = manager.register(m.uuid, s.id, contact()).await.unwrap();
        assert_eq!(change.outcome, Outcome::Ok);

        let stored_meeting = manager.documents().load::<Meeting>(m.uuid).await.unwrap();
        let stored_student = manager.documents().load::<Student>(s.id).await.unwrap();
        assert_eq!(stored_meeting, change.meeting);
        assert_eq!(stored_student, change.student);
        assert_eq!(stored_student.counter(SessionLevel::JuniorA), counts(1, 0));
    }

    #[tokio::test]
    async fn manager_reports_missing_documents() {
        let (manager, m, s) = seeded(SessionLevel::JuniorA).await;

        let err = manager.register(Uuid::new_v4(), s.id, contact()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        let err = manager.mark_attendance(m.uuid, Uuid::new_v4(), true).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn manager_unregister_of_stranger_is_not_registered() {
        let (manager, m, s) = seeded(SessionLevel::Senior).await;

        let change = manager.unregister(m.uuid, s.id).await.unwrap();
        assert_eq!(change.outcome, Outcome::NotRegistered);
        assert!(change.meeting.roster.is_empty());
        assert_eq!(change.student.counter(SessionLevel::Senior), counts(0, 0));
    }

    #[tokio::test]
    async fn concurrent_registrations_do_not_duplicate() {
        let (manager, m, s) = seeded(SessionLevel::JuniorB).await;
        let (meeting_id, student_id) = (m.uuid, s.id);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.register(meeting_id, student_id, contact()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = manager.documents().load::<Meeting>(m.uuid).await.unwrap();
        assert_eq!(stored.roster.len(), 1);
        let student = manager.documents().load::<Student>(s.id).await.unwrap();
        assert_eq!(student.counter(SessionLevel::JuniorB), counts(1, 0));
    }

    #[tokio::test]
    async fn concurrent_students_are_all_kept() {
        let (manager, m, _) = seeded(SessionLevel::JuniorA).await;
        let meeting_id = m.uuid;
        let mut ids = Vec::new();
        for _ in 0..8 {
            let s = student();
            manager.documents().save(&s).await.unwrap();
            ids.push(s.id);
        }

        let tasks: Vec<_> = ids
            .iter()
            .map(|id| {
                let (manager, id) = (manager.clone(), *id);
                tokio::spawn(async move { manager.register(meeting_id, id, contact()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = manager.documents().load::<Meeting>(m.uuid).await.unwrap();
        assert_eq!(stored.roster.len(), ids.len());
    }

    #[tokio::test]
    async fn cancel_meeting_clears_student_ledgers() {
        let (manager, m, s) = seeded(SessionLevel::Senior).await;
        manager.register(m.uuid, s.id, contact()).await.unwrap();

        let cancelled = manager.cancel_meeting(m.uuid).await.unwrap();
        assert!(cancelled.roster.is_empty());
        assert!(manager.documents().find::<Meeting>(m.uuid).await.unwrap().is_none());

        let student = manager.documents().load::<Student>(s.id).await.unwrap();
        assert!(student.meetings_registered.is_empty());
        assert_eq!(student.counter(SessionLevel::Senior), counts(0, 0));
    }

    #[tokio::test]
    async fn withdraw_student_leaves_every_roster() {
        let (manager, first, s) = seeded(SessionLevel::JuniorA).await;
        let second = meeting(SessionLevel::Senior);
        manager.documents().save(&second).await.unwrap();
        manager.register(first.uuid, s.id, contact()).await.unwrap();
        manager.register(second.uuid, s.id, contact()).await.unwrap();

        let student = manager.withdraw_student(s.id).await.unwrap();
        assert!(student.meetings_registered.is_empty());
        for id in [first.uuid, second.uuid] {
            let stored = manager.documents().load::<Meeting>(id).await.unwrap();
            assert!(!stored.is_registered(s.id));
        }
    }

    #[tokio::test]
    async fn removal_rechecks_registrations_made_after_withdrawal() {
        let (manager, m, s) = seeded(SessionLevel::JuniorA).await;
        manager.register(m.uuid, s.id, contact()).await.unwrap();
        manager.withdraw_student(s.id).await.unwrap();

        // a registration sneaking in after the withdrawal pass
        manager.register(m.uuid, s.id, contact()).await.unwrap();
        assert!(!manager.delete_if_withdrawn(s.id).await.unwrap());
        assert!(manager.documents().find::<Student>(s.id).await.unwrap().is_some());

        manager.remove_student(s.id).await.unwrap();
        assert!(manager.documents().find::<Student>(s.id).await.unwrap().is_none());
        let stored = manager.documents().load::<Meeting>(m.uuid).await.unwrap();
        assert!(stored.roster.is_empty());

        let err = manager.register(m.uuid, s.id, contact()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn removal_races_with_registrations() {
        let (manager, m, s) = seeded(SessionLevel::Senior).await;
        let (meeting_id, student_id) = (m.uuid, s.id);

        let registrations: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.register(meeting_id, student_id, contact()).await })
            })
            .collect();
        let removal = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.remove_student(student_id).await })
        };
        for task in registrations {
            // registrations after the delete see a missing student
            let _ = task.await.unwrap();
        }
        removal.await.unwrap().unwrap();

        assert!(manager.documents().find::<Student>(s.id).await.unwrap().is_none());
        let stored = manager.documents().load::<Meeting>(m.uuid).await.unwrap();
        assert!(!stored.is_registered(s.id));
    }

    #[tokio::test]
    async fn level_change_moves_counts() {
        let (manager, m, s) = seeded(SessionLevel::JuniorA).await;
        manager.register(m.uuid, s.id, contact()).await.unwrap();
        manager.mark_attendance(m.uuid, s.id, true).await.unwrap();

        let edited = manager
            .edit_meeting(m.uuid, |meeting| meeting.session_level = SessionLevel::JuniorB)
            .await
            .unwrap();
        assert_eq!(edited.session_level, SessionLevel::JuniorB);

        let student = manager.documents().load::<Student>(s.id).await.unwrap();
        assert_eq!(student.counter(SessionLevel::JuniorA), counts(0, 0));
        assert_eq!(student.counter(SessionLevel::JuniorB), counts(1, 1));
    }
}
