use std::collections::BTreeMap;

use axum::extract::Query;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{authorize, Role, SessionHeader};
use crate::meetings::{self, AdminMeetingView, MeetingDetails, MeetingSearch, UpdateMeeting};
use crate::models::{MeetingCounter, SessionLevel, Student, StudentProfile};
use crate::profiles::{self, ProfileView};
use crate::roster::Outcome;
use crate::{breaks, proceeds, AppState, Error, Payload};

#[derive(Debug, Clone, Serialize)]
pub struct ProfileList {
    pub profiles: Vec<ProfileView>,
}

pub async fn list_profiles(
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<ProfileList> {
    authorize(header, &pg, Role::Admin).await?;
    let docs = state.docs();
    let mut profiles = Vec::new();
    for profile in docs.all::<StudentProfile>().await? {
        profiles.push(ProfileView::load(docs, profile).await?);
    }
    profiles.sort_by(|a, b| a.email.cmp(&b.email));
    proceeds(ProfileList { profiles })
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountQuery {
    pub account_uuid: Uuid,
}

pub async fn get_profile(
    Query(query): Query<AccountQuery>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<ProfileView> {
    authorize(header, &pg, Role::Admin).await?;
    let profile = state
        .docs()
        .find::<StudentProfile>(query.account_uuid)
        .await?
        .ok_or_else(|| Error::not_found("Could not find account with that account_uuid"))?;
    proceeds(ProfileView::load(state.docs(), profile).await?)
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminMeetings {
    pub meetings: Vec<AdminMeetingView>,
}

pub async fn search_meetings(
    Json(search): Json<MeetingSearch>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<AdminMeetings> {
    authorize(header, &pg, Role::Admin).await?;
    let docs = state.docs();
    let mut views = Vec::new();
    for meeting in meetings::search(docs, &search).await? {
        views.push(AdminMeetingView::load(docs, meeting).await?);
    }
    proceeds(AdminMeetings { meetings: views })
}

pub async fn create_meeting(
    Json(details): Json<MeetingDetails>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<AdminMeetingView> {
    authorize(header, &pg, Role::Admin).await?;
    let meeting = meetings::create(state.docs(), details).await?;
    proceeds(AdminMeetingView::load(state.docs(), meeting).await?)
}

pub async fn update_meeting(
    Json(update): Json<UpdateMeeting>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<AdminMeetingView> {
    authorize(header, &pg, Role::Admin).await?;
    let meeting = meetings::update(&state.roster, update).await?;
    proceeds(AdminMeetingView::load(state.docs(), meeting).await?)
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeetingId {
    pub meeting_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeetingDeleted {
    pub meeting_id: Uuid,
}

pub async fn delete_meeting(
    Json(target): Json<MeetingId>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<MeetingDeleted> {
    authorize(header, &pg, Role::Admin).await?;
    let meeting = state.roster.cancel_meeting(target.meeting_id).await?;
    proceeds(MeetingDeleted {
        meeting_id: meeting.uuid,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendanceUpdate {
    pub meeting_id: Uuid,
    pub student_id: Uuid,
    pub attended: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceResult {
    pub outcome: Outcome,
    pub meeting_id: Uuid,
    pub student_id: Uuid,
    pub attended: bool,
    pub meeting_counts: BTreeMap<SessionLevel, MeetingCounter>,
}

pub async fn update_attendance(
    Json(update): Json<AttendanceUpdate>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<AttendanceResult> {
    authorize(header, &pg, Role::Admin).await?;
    let change = state
        .roster
        .mark_attendance(update.meeting_id, update.student_id, update.attended)
        .await?;

    if change.outcome == Outcome::NotRegistered {
        return breaks(Error::NotRegistered {
            message: format!(
                "Student with id {} is not registered for meeting {}",
                update.student_id, update.meeting_id
            ),
        });
    }
    proceeds(AttendanceResult {
        outcome: change.outcome,
        meeting_id: change.meeting.uuid,
        student_id: change.student.id,
        attended: update.attended,
        meeting_counts: change.student.meeting_counts,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct Verification {
    pub student_id: Uuid,
    pub status: bool,
}

pub async fn update_verification(
    Json(verification): Json<Verification>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<Student> {
    authorize(header, &pg, Role::Admin).await?;
    proceeds(
        profiles::set_verification(&state.roster, verification.student_id, verification.status)
            .await?,
    )
}
