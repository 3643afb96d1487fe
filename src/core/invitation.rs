//! Invitation codes: generation and redemption for media-server accounts

use lazy_regex::regex_is_match;
use rand::distr::Alphanumeric;
use rand::Rng;
use rusqlite::Connection;
use serde::Serialize;

use crate::core::error::{AppError, AppResult};
use crate::media::MediaServer;
use crate::storage::db::{apply_credit_delta, get_connection, require_user, write_transaction, DbPool};
use crate::storage::{accounts, invitations};

pub const CODE_LENGTH: usize = 12;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const PASSWORD_LENGTH: usize = 12;
pub const MAX_BATCH: usize = 100;

/// Credentials of a freshly created media-server account
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RedeemedAccount {
    pub server: String,
    pub username: String,
    pub password: String,
}

fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

fn random_password<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..PASSWORD_LENGTH).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

/// Stores a fresh code that does not collide with an existing one
pub(crate) fn insert_unique_code<R: Rng + ?Sized>(conn: &Connection, owner_tg_id: i64, rng: &mut R) -> AppResult<String> {
    for _ in 0..8 {
        let code = random_code(rng);
        if invitations::get_code(conn, &code)?.is_none() {
            invitations::insert_code(conn, &code, owner_tg_id)?;
            return Ok(code);
        }
    }
    Err(AppError::Conflict("Could not generate a unique invitation code".to_string()))
}

/// Buys one invitation code for `cost` credits (admins pass 0)
pub fn generate<R: Rng + ?Sized>(conn: &Connection, owner_tg_id: i64, cost: f64, rng: &mut R) -> AppResult<String> {
    let tx = write_transaction(conn)?;
    if cost > 0.0 {
        apply_credit_delta(&tx, owner_tg_id, -cost, "invitation code")?;
    } else {
        require_user(&tx, owner_tg_id)?;
    }
    let code = insert_unique_code(&tx, owner_tg_id, rng)?;
    tx.commit()?;

    log::info!("User {} generated invitation code (cost {:.2})", owner_tg_id, cost);
    Ok(code)
}

/// Creates `count` free codes owned by an admin
pub fn generate_batch<R: Rng + ?Sized>(
    conn: &Connection,
    owner_tg_id: i64,
    count: usize,
    rng: &mut R,
) -> AppResult<Vec<String>> {
    if count == 0 || count > MAX_BATCH {
        return Err(AppError::Validation(format!(
            "Number of codes must be between 1 and {}",
            MAX_BATCH
        )));
    }

    let tx = write_transaction(conn)?;
    let codes = (0..count)
        .map(|_| insert_unique_code(&tx, owner_tg_id, rng))
        .collect::<AppResult<Vec<_>>>()?;
    tx.commit()?;

    log::info!("Admin {} generated {} invitation codes", owner_tg_id, count);
    Ok(codes)
}

/// Checks a requested media-server username
pub fn validate_username(username: &str) -> AppResult<()> {
    if regex_is_match!(r"^[A-Za-z0-9_.\-]{3,32}$", username) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "Username must be 3-32 characters: letters, digits, '_', '.' or '-'".to_string(),
        ))
    }
}

/// Redeems `code` for a new account named `username` on `media`.
///
/// The code is claimed before the remote call and released again when the
/// media server refuses the account, so a failed attempt never burns a code.
/// A remote account that cannot be stored locally is deleted again.
pub async fn redeem<R: Rng + Send + ?Sized>(
    pool: &DbPool,
    media: &dyn MediaServer,
    code: &str,
    tg_id: i64,
    username: &str,
    rng: &mut R,
) -> AppResult<RedeemedAccount> {
    let username = username.trim();
    validate_username(username)?;
    let code = code.trim().to_uppercase();
    let server = media.kind().to_string();
    let password = random_password(rng);

    {
        let conn = get_connection(pool)?;
        require_user(&conn, tg_id)?;
        if accounts::account_for_user_on(&conn, tg_id, &server)?.is_some() {
            return Err(AppError::Conflict("You already have an account on this server".to_string()));
        }
        if accounts::find_by_username(&conn, &server, username)?.is_some() {
            return Err(AppError::Conflict(format!("Username '{}' is already taken", username)));
        }
        let invitation = invitations::get_code(&conn, &code)?
            .ok_or_else(|| AppError::NotFound("Invitation code does not exist".to_string()))?;
        if invitation.is_used() || !invitations::claim_code(&conn, &code, tg_id)? {
            return Err(AppError::Conflict("Invitation code has already been used".to_string()));
        }
    }

    let server_user_id = match media.create_user(username, &password).await {
        Ok(id) => id,
        Err(e) => {
            log::error!("Failed to create {} user '{}' for {}: {}", server, username, tg_id, e);
            let conn = get_connection(pool)?;
            invitations::release_code(&conn, &code, tg_id)?;
            return Err(e);
        }
    };

    let stored = {
        let conn = get_connection(pool)?;
        accounts::insert_account(&conn, tg_id, &server, &server_user_id, username)
    };
    if let Err(e) = stored {
        log::error!(
            "Created {} user {} but failed to store it for {}: {}",
            server,
            server_user_id,
            tg_id,
            e
        );
        if let Err(cleanup) = media.delete_user(&server_user_id).await {
            log::error!("Failed to remove orphaned {} user {}: {}", server, server_user_id, cleanup);
        }
        let conn = get_connection(pool)?;
        invitations::release_code(&conn, &code, tg_id)?;
        return Err(e);
    }

    log::info!("User {} redeemed invitation code for {} account '{}'", tg_id, server, username);
    Ok(RedeemedAccount {
        server,
        username: username.to_string(),
        password,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::db::{adjust_credits, ensure_user, get_user, test_pool};
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory media server
    #[derive(Default)]
    pub(crate) struct FakeMediaServer {
        pub users: Mutex<HashMap<String, (String, bool)>>,
        pub watched: Mutex<HashMap<String, i64>>,
        pub deleted: Mutex<Vec<String>>,
        pub fail_create: bool,
        /// Runs after the remote user exists, before `create_user` returns
        pub after_create: Option<Box<dyn Fn() + Send + Sync>>,
    }

    #[async_trait]
    impl MediaServer for FakeMediaServer {
        fn kind(&self) -> &str {
            "emby"
        }

        async fn create_user(&self, username: &str, _password: &str) -> AppResult<String> {
            if self.fail_create {
                return Err(AppError::MediaServer("create user failed with status 500".to_string()));
            }
            let id = {
                let mut users = self.users.lock().unwrap();
                let id = format!("id-{}", users.len() + 1);
                users.insert(id.clone(), (username.to_string(), true));
                id
            };
            if let Some(hook) = &self.after_create {
                hook();
            }
            Ok(id)
        }

        async fn delete_user(&self, user_id: &str) -> AppResult<()> {
            self.users.lock().unwrap().remove(user_id);
            self.deleted.lock().unwrap().push(user_id.to_string());
            Ok(())
        }

        async fn set_enabled(&self, user_id: &str, enabled: bool) -> AppResult<()> {
            let mut users = self.users.lock().unwrap();
            let user = users
                .get_mut(user_id)
                .ok_or_else(|| AppError::NotFound(user_id.to_string()))?;
            user.1 = enabled;
            Ok(())
        }

        async fn watched_minutes(&self, user_id: &str) -> AppResult<i64> {
            Ok(self.watched.lock().unwrap().get(user_id).copied().unwrap_or(0))
        }

        async fn ping(&self) -> AppResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_generate_charges_and_creates_code() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        ensure_user(&conn, 1, None, None).unwrap();
        adjust_credits(&conn, 1, 300.0, "seed").unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let code = generate(&conn, 1, 288.0, &mut rng).unwrap();
        assert_eq!(code.len(), CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_eq!(get_user(&conn, 1).unwrap().unwrap().credits, 12.0);

        assert!(matches!(
            generate(&conn, 1, 288.0, &mut rng),
            Err(AppError::InsufficientCredits { .. })
        ));
        assert_eq!(invitations::codes_by_owner(&conn, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_generate_batch_bounds() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        ensure_user(&conn, 1, None, None).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(generate_batch(&conn, 1, 5, &mut rng).unwrap().len(), 5);
        assert!(matches!(generate_batch(&conn, 1, 0, &mut rng), Err(AppError::Validation(_))));
        assert!(matches!(
            generate_batch(&conn, 1, MAX_BATCH + 1, &mut rng),
            Err(AppError::Validation(_))
        ));
        assert_eq!(invitations::count_unused(&conn).unwrap(), 5);
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("a.b-c").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
    }

    #[tokio::test]
    async fn test_redeem_creates_account_once() {
        let (_dir, pool) = test_pool();
        let media = FakeMediaServer::default();
        let mut rng = StdRng::seed_from_u64(3);
        let code = {
            let conn = get_connection(&pool).unwrap();
            ensure_user(&conn, 1, None, None).unwrap();
            ensure_user(&conn, 2, None, None).unwrap();
            ensure_user(&conn, 3, None, None).unwrap();
            generate(&conn, 1, 0.0, &mut rng).unwrap()
        };

        let account = redeem(&pool, &media, &code.to_lowercase(), 2, "bob", &mut rng).await.unwrap();
        assert_eq!(account.username, "bob");
        assert_eq!(account.password.len(), 12);
        assert_eq!(media.users.lock().unwrap().len(), 1);

        // Used code
        let err = redeem(&pool, &media, &code, 3, "carol", &mut rng).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Second account for the same user
        let other = generate(&get_connection(&pool).unwrap(), 1, 0.0, &mut rng).unwrap();
        let err = redeem(&pool, &media, &other, 2, "bob2", &mut rng).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Username taken (case-insensitive)
        let err = redeem(&pool, &media, &other, 3, "BOB", &mut rng).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = redeem(&pool, &media, "NOPE00000000", 3, "carol", &mut rng).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_redeem_releases_code_when_server_fails() {
        let (_dir, pool) = test_pool();
        let media = FakeMediaServer {
            fail_create: true,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(9);
        let code = {
            let conn = get_connection(&pool).unwrap();
            ensure_user(&conn, 1, None, None).unwrap();
            generate(&conn, 1, 0.0, &mut rng).unwrap()
        };

        let err = redeem(&pool, &media, &code, 1, "dave", &mut rng).await.unwrap_err();
        assert!(matches!(err, AppError::MediaServer(_)));

        let conn = get_connection(&pool).unwrap();
        assert!(!invitations::get_code(&conn, &code).unwrap().unwrap().is_used());
        assert!(accounts::accounts_for_user(&conn, 1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redeem_removes_remote_user_when_store_fails() {
        let (_dir, pool) = test_pool();
        let mut rng = StdRng::seed_from_u64(11);
        let code = {
            let conn = get_connection(&pool).unwrap();
            ensure_user(&conn, 1, None, None).unwrap();
            generate(&conn, 1, 0.0, &mut rng).unwrap()
        };

        // Another redemption by the same user lands while the remote call runs
        let racing_pool = pool.clone();
        let media = FakeMediaServer {
            after_create: Some(Box::new(move || {
                let conn = get_connection(&racing_pool).unwrap();
                accounts::insert_account(&conn, 1, "emby", "id-other", "erin_other").unwrap();
            })),
            ..Default::default()
        };

        assert!(redeem(&pool, &media, &code, 1, "erin", &mut rng).await.is_err());
        assert_eq!(*media.deleted.lock().unwrap(), vec!["id-1".to_string()]);
        assert!(media.users.lock().unwrap().is_empty());

        let conn = get_connection(&pool).unwrap();
        assert!(!invitations::get_code(&conn, &code).unwrap().unwrap().is_used());
        let stored = accounts::accounts_for_user(&conn, 1).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].server_user_id, "id-other");
    }
}
