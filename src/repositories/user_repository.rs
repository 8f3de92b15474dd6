use crate::error::LedgerError;
use crate::models::entities::{NewUser, User};
use crate::schema::users;
use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = users)]
pub struct UserChanges<'a> {
    pub email: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
}

pub struct UserRepository;

impl UserRepository {
    pub fn create(conn: &mut PgConnection, new_user: NewUser<'_>) -> Result<User, LedgerError> {
        diesel::insert_into(users::table)
            .values(new_user)
            .get_result(conn)
            .map_err(LedgerError::Database)
    }

    pub fn update(
        conn: &mut PgConnection,
        user_id: Uuid,
        changes: UserChanges<'_>,
    ) -> Result<User, LedgerError> {
        diesel::update(users::table.find(user_id))
            .set((changes, users::updated_at.eq(Utc::now())))
            .get_result(conn)
            .map_err(|e| match e {
                diesel::result::Error::NotFound => LedgerError::UserNotFound,
                other => LedgerError::Database(other),
            })
    }

    pub fn find_by_id(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<User>, LedgerError> {
        users::table
            .find(user_id)
            .first(conn)
            .optional()
            .map_err(LedgerError::Database)
    }

    pub fn find_by_email(
        conn: &mut PgConnection,
        email: &str,
    ) -> Result<Option<User>, LedgerError> {
        users::table
            .filter(users::email.eq(email))
            .first(conn)
            .optional()
            .map_err(LedgerError::Database)
    }

    pub fn exists(conn: &mut PgConnection, user_id: Uuid) -> Result<bool, LedgerError> {
        let found: Option<Uuid> = users::table
            .find(user_id)
            .select(users::id)
            .first(conn)
            .optional()
            .map_err(LedgerError::Database)?;
        Ok(found.is_some())
    }
}
