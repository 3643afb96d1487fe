//! Media account administration

use crate::core::error::{AppError, AppResult};
use crate::media::MediaServer;
use crate::storage::accounts::{self, MediaAccount};
use crate::storage::db::{get_connection, DbPool};

/// Enables or disables a media account on the server and locally
pub async fn set_account_enabled(
    pool: &DbPool,
    media: &dyn MediaServer,
    username: &str,
    enabled: bool,
) -> AppResult<MediaAccount> {
    let account = {
        let conn = get_connection(pool)?;
        accounts::find_by_username(&conn, media.kind(), username.trim())?
            .ok_or_else(|| AppError::NotFound(format!("No {} account named '{}'", media.kind(), username.trim())))?
    };

    media.set_enabled(&account.server_user_id, enabled).await?;

    let conn = get_connection(pool)?;
    accounts::set_active(&conn, account.id, enabled)?;
    log::info!(
        "{} account '{}' of user {} {}",
        account.server,
        account.username,
        account.tg_id,
        if enabled { "enabled" } else { "disabled" }
    );

    Ok(MediaAccount {
        is_active: enabled,
        ..account
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::invitation::tests::FakeMediaServer;
    use crate::storage::db::{ensure_user, test_pool};

    #[tokio::test]
    async fn test_disable_and_enable() {
        let (_dir, pool) = test_pool();
        let media = FakeMediaServer::default();
        let server_id = media.create_user("alice", "pw").await.unwrap();
        {
            let conn = get_connection(&pool).unwrap();
            ensure_user(&conn, 1, None, None).unwrap();
            accounts::insert_account(&conn, 1, "emby", &server_id, "alice").unwrap();
        }

        let account = set_account_enabled(&pool, &media, "ALICE", false).await.unwrap();
        assert!(!account.is_active);
        assert!(!media.users.lock().unwrap()[&server_id].1);

        set_account_enabled(&pool, &media, "alice", true).await.unwrap();
        let conn = get_connection(&pool).unwrap();
        assert!(accounts::find_by_username(&conn, "emby", "alice").unwrap().unwrap().is_active);

        assert!(matches!(
            set_account_enabled(&pool, &media, "nobody", false).await,
            Err(AppError::NotFound(_))
        ));
    }
}
