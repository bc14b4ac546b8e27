use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::validate_email;
use crate::err::Error;
use crate::models::{Guardian, SessionLevel, Student, StudentDetails, StudentProfile};
use crate::roster::RosterManager;
use crate::store::Documents;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProfile {
    pub email: String,
    pub students: Vec<StudentDetails>,
    pub guardians: Vec<Guardian>,
    #[serde(default)]
    pub mailing_lists: Vec<SessionLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudentUpdate {
    /// `None` adds a new student to the profile.
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(flatten)]
    pub details: StudentDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfile {
    pub email: String,
    pub students: Vec<StudentUpdate>,
    pub guardians: Vec<Guardian>,
    #[serde(default)]
    pub mailing_lists: Vec<SessionLevel>,
}

/// A profile with its students resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub uuid: Uuid,
    pub email: String,
    pub students: Vec<Student>,
    pub guardians: Vec<Guardian>,
    pub mailing_lists: Vec<SessionLevel>,
}

impl ProfileView {
    pub async fn load(docs: &Documents, profile: StudentProfile) -> Result<Self, Error> {
        let students = profile_students(docs, &profile).await?;
        Ok(Self {
            uuid: profile.uuid,
            email: profile.email,
            students,
            guardians: profile.guardians,
            mailing_lists: profile.mailing_lists,
        })
    }
}

fn validate_details(details: &StudentDetails) -> Result<(), Error> {
    if details.first_name.trim().is_empty() || details.last_name.trim().is_empty() {
        return Err(Error::invalid("students need a first and last name"));
    }
    if let Some(month) = details.birth_month {
        if !(1..=12).contains(&month) {
            return Err(Error::invalid(format!("`{}` is not a month", month)));
        }
    }
    Ok(())
}

/// The profile's students, skipping (and logging) dangling references.
pub async fn profile_students(docs: &Documents, profile: &StudentProfile) -> Result<Vec<Student>, Error> {
    let mut students = Vec::with_capacity(profile.students.len());
    for id in &profile.students {
        match docs.find::<Student>(*id).await? {
            Some(student) => students.push(student),
            None => log::warn!("profile {} references missing student {}", profile.uuid, id),
        }
    }
    Ok(students)
}

pub async fn create_profile(
    docs: &Documents,
    account_uuid: Uuid,
    create: CreateProfile,
) -> Result<ProfileView, Error> {
    if docs.find::<StudentProfile>(account_uuid).await?.is_some() {
        return Err(Error::AccountAlreadyExists {
            message: "A profile for that account already exists".to_string(),
        });
    }
    validate_email(&create.email)?;
    for details in &create.students {
        validate_details(details)?;
    }

    let mut ids = Vec::with_capacity(create.students.len());
    for details in create.students {
        let student = Student::new(account_uuid, details);
        docs.save(&student).await?;
        ids.push(student.id);
    }

    let profile = StudentProfile {
        uuid: account_uuid,
        email: create.email.trim().to_string(),
        students: ids,
        guardians: create.guardians,
        mailing_lists: create.mailing_lists,
    };
    docs.save(&profile).await?;
    log::info!(
        "profile {} created with {} students",
        profile.uuid,
        profile.students.len()
    );
    ProfileView::load(docs, profile).await
}

/// Replaces the profile's contact data and reconciles its students: listed
/// ids are updated, entries without an id are created and students no longer
/// listed are withdrawn from their meetings and deleted.
pub async fn update_profile(
    roster: &RosterManager,
    account_uuid: Uuid,
    update: UpdateProfile,
) -> Result<ProfileView, Error> {
    let docs = roster.documents();
    let mut profile = docs.load::<StudentProfile>(account_uuid).await?;
    validate_email(&update.email)?;

    let owned: HashSet<Uuid> = profile.students.iter().copied().collect();
    for entry in &update.students {
        validate_details(&entry.details)?;
        if let Some(id) = entry.id {
            if !owned.contains(&id) {
                return Err(Error::invalid(format!(
                    "student `{}` does not belong to this profile",
                    id
                )));
            }
        }
    }

    let kept: HashSet<Uuid> = update.students.iter().filter_map(|s| s.id).collect();
    for id in profile.students.iter().filter(|id| !kept.contains(id)) {
        match roster.remove_student(*id).await {
            Ok(()) => log::info!("student {} removed from profile {}", id, account_uuid),
            Err(Error::NotFound { .. }) => continue,
            Err(err) => return Err(err),
        }
    }

    let mut ids = Vec::with_capacity(update.students.len());
    for entry in update.students {
        match entry.id {
            Some(id) => {
                let details = entry.details;
                roster
                    .edit_student(id, move |student| student.apply_details(details))
                    .await?;
                ids.push(id);
            }
            None => {
                let student = Student::new(account_uuid, entry.details);
                docs.save(&student).await?;
                ids.push(student.id);
            }
        }
    }

    profile.email = update.email.trim().to_string();
    profile.guardians = update.guardians;
    profile.mailing_lists = update.mailing_lists;
    profile.students = ids;
    docs.save(&profile).await?;
    ProfileView::load(docs, profile).await
}

/// Loads `student_id`, refusing students that belong to another account.
pub async fn owned_student(docs: &Documents, account_uuid: Uuid, student_id: Uuid) -> Result<Student, Error> {
    let student = docs.load::<Student>(student_id).await?;
    if student.profile_uuid != account_uuid {
        return Err(Error::forbidden(
            "Student id is associated with a different account",
        ));
    }
    Ok(student)
}

pub async fn set_verification(roster: &RosterManager, student_id: Uuid, status: bool) -> Result<Student, Error> {
    roster
        .edit_student(student_id, |student| student.verification_status = status)
        .await
}
