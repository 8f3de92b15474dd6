use crate::error::LedgerError;
use crate::models::app_state::AppState;
use crate::models::dtos::{CreateUserRequest, UpdateUserRequest, UserResponse};
use crate::models::entities::NewUser;
use crate::models::enums::UserRole;
use crate::models::events::DomainEvent;
use crate::repositories::event_store::EventStore;
use crate::repositories::user_repository::{UserChanges, UserRepository};
use diesel::Connection;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

pub struct UserService;

impl UserService {
    pub async fn create(
        state: &AppState,
        req: CreateUserRequest,
    ) -> Result<UserResponse, LedgerError> {
        req.validate()?;

        let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)?;

        let mut conn = state.cluster.master_conn()?;
        let (user, committed) = conn.transaction::<_, LedgerError, _>(|conn| {
            if UserRepository::find_by_email(conn, &req.email)?.is_some() {
                return Err(LedgerError::InvalidState(
                    "email is already registered".to_string(),
                ));
            }

            let user = UserRepository::create(
                conn,
                NewUser {
                    email: &req.email,
                    password_hash: &password_hash,
                    first_name: &req.first_name,
                    last_name: &req.last_name,
                    role: UserRole::User,
                },
            )?;

            let event = DomainEvent::user_created(&user)?;
            let committed = EventStore::append(conn, user.id, vec![event], 0)?;

            Ok((user, committed))
        })?;

        state.events.publish_all(committed);
        info!(user = %user.id, "user created");
        Ok(user.into())
    }

    pub async fn get(state: &AppState, user_id: Uuid) -> Result<UserResponse, LedgerError> {
        let mut conn = state.cluster.replica_conn()?;
        UserRepository::find_by_id(&mut conn, user_id)?
            .map(Into::into)
            .ok_or(LedgerError::UserNotFound)
    }

    pub async fn update(
        state: &AppState,
        user_id: Uuid,
        req: UpdateUserRequest,
    ) -> Result<UserResponse, LedgerError> {
        req.validate()?;
        if req.email.is_none() && req.first_name.is_none() && req.last_name.is_none() {
            return Err(LedgerError::InvalidState("nothing to update".to_string()));
        }

        let mut conn = state.cluster.master_conn()?;
        let (user, committed) = conn.transaction::<_, LedgerError, _>(|conn| {
            if let Some(email) = &req.email {
                if let Some(existing) = UserRepository::find_by_email(conn, email)? {
                    if existing.id != user_id {
                        return Err(LedgerError::InvalidState(
                            "email is already registered".to_string(),
                        ));
                    }
                }
            }

            let user = UserRepository::update(
                conn,
                user_id,
                UserChanges {
                    email: req.email.as_deref(),
                    first_name: req.first_name.as_deref(),
                    last_name: req.last_name.as_deref(),
                },
            )?;

            let expected = EventStore::current_version(conn, user_id)?;
            let event = DomainEvent::user_updated(
                user_id,
                req.email.clone(),
                req.first_name.clone(),
                req.last_name.clone(),
            )?;
            let committed = EventStore::append(conn, user_id, vec![event], expected)?;

            Ok((user, committed))
        })?;

        state.events.publish_all(committed);
        info!(user = %user.id, "user updated");
        Ok(user.into())
    }
}
