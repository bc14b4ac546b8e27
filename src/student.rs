use std::collections::BTreeMap;

use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{authorize, Role, SessionHeader};
use crate::meetings::{self, MeetingSearch, StudentMeetingView};
use crate::models::{MeetingCounter, SessionLevel, StudentProfile};
use crate::profiles::{self, CreateProfile, ProfileView, UpdateProfile};
use crate::roster::Outcome;
use crate::store::Documents;
use crate::{breaks, proceeds, AppState, Error, Payload};

async fn own_profile(docs: &Documents, account_uuid: Uuid) -> Result<StudentProfile, Error> {
    docs.find::<StudentProfile>(account_uuid)
        .await?
        .ok_or_else(|| Error::not_found("This account has no profile"))
}

pub async fn create_profile(
    Json(create): Json<CreateProfile>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<ProfileView> {
    let account = authorize(header, &pg, Role::Student).await?;
    proceeds(profiles::create_profile(state.docs(), account.uuid, create).await?)
}

pub async fn get_profile(
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<ProfileView> {
    let account = authorize(header, &pg, Role::Student).await?;
    let profile = own_profile(state.docs(), account.uuid).await?;
    proceeds(ProfileView::load(state.docs(), profile).await?)
}

pub async fn update_profile(
    Json(update): Json<UpdateProfile>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<ProfileView> {
    let account = authorize(header, &pg, Role::Student).await?;
    proceeds(profiles::update_profile(&state.roster, account.uuid, update).await?)
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentMeetings {
    pub meetings: Vec<StudentMeetingView>,
}

pub async fn search_meetings(
    Json(search): Json<MeetingSearch>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<StudentMeetings> {
    let account = authorize(header, &pg, Role::Student).await?;
    let docs = state.docs();
    let profile = own_profile(docs, account.uuid).await?;
    let students = profiles::profile_students(docs, &profile).await?;

    let meetings = meetings::search(docs, &search)
        .await?
        .iter()
        .map(|meeting| StudentMeetingView::new(meeting, &students))
        .collect();
    proceeds(StudentMeetings { meetings })
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub meeting_id: Uuid,
    pub student_id: Uuid,
    pub registered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResult {
    pub outcome: Outcome,
    pub meeting_id: Uuid,
    pub student_id: Uuid,
    pub registered: bool,
    pub meeting_counts: BTreeMap<SessionLevel, MeetingCounter>,
}

/// Registers or unregisters one of the caller's students for a meeting.
pub async fn update_registration(
    Json(request): Json<RegistrationRequest>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<RegistrationResult> {
    let account = authorize(header, &pg, Role::Student).await?;
    let docs = state.docs();
    let profile = own_profile(docs, account.uuid).await?;
    profiles::owned_student(docs, account.uuid, request.student_id).await?;

    let change = if request.registered {
        state
            .roster
            .register(request.meeting_id, request.student_id, profile.contact_snapshot())
            .await?
    } else {
        state
            .roster
            .unregister(request.meeting_id, request.student_id)
            .await?
    };

    if change.outcome == Outcome::NotRegistered {
        return breaks(Error::NotRegistered {
            message: format!(
                "Student with id {} is not registered for meeting {}",
                request.student_id, request.meeting_id
            ),
        });
    }
    proceeds(RegistrationResult {
        outcome: change.outcome,
        meeting_id: change.meeting.uuid,
        student_id: change.student.id,
        registered: change.meeting.is_registered(change.student.id),
        meeting_counts: change.student.meeting_counts,
    })
}
