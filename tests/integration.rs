//! Integration tests for mariadb-wire
//!
//! These tests require a running MariaDB instance configured through the
//! `DB_*` environment variables (see `.env.example`).

use futures::FutureExt;
use mariadb_wire::{
    close_connection, load_configuration, open_connection, scoped_connection, ConnectionConfig,
    Error,
};

fn config() -> ConnectionConfig {
    load_configuration().expect("DB_* variables must be set")
}

#[tokio::test]
#[ignore] // Requires MariaDB running
async fn test_connect_and_query_version() {
    let mut conn = open_connection(&config()).await.expect("connect");

    let rs = conn.query("SELECT VERSION()").await.expect("query");
    assert_eq!(rs.len(), 1);
    let version = rs.scalar().expect("version");
    assert!(!version.is_empty());

    close_connection(&mut conn).await.expect("close");
    assert!(conn.is_closed());
}

#[tokio::test]
#[ignore] // Requires MariaDB running
async fn test_wrong_password_is_rejected() {
    let mut config = config();
    config.password.push_str("-definitely-wrong");

    let err = open_connection(&config).await.unwrap_err();
    assert!(err.is_authentication_failure(), "got {err:?}");
    assert_eq!(err.server_error().map(|e| e.code), Some(1045));
}

#[tokio::test]
#[ignore] // Requires MariaDB running
async fn test_scoped_connection_round_trip() {
    let n = scoped_connection(&config(), |conn| {
        async move {
            let rs = conn.query("SELECT 40 + 2").await?;
            Ok::<_, Error>(rs.scalar().unwrap_or("0").parse::<u32>().unwrap_or(0))
        }
        .boxed()
    })
    .await
    .expect("scoped query");

    assert_eq!(n, 42);
}

#[tokio::test]
#[ignore] // Requires MariaDB running
async fn test_connection_id_visible_to_server() {
    let mut conn = open_connection(&config()).await.expect("connect");

    let rs = conn.query("SELECT CONNECTION_ID()").await.expect("query");
    let id: u32 = rs.scalar().expect("id").parse().expect("numeric id");
    assert_eq!(id, conn.connection_id());

    conn.close().await.expect("close");
}

#[tokio::test]
#[ignore] // Requires MariaDB running
async fn test_syntax_error_leaves_connection_usable() {
    let mut conn = open_connection(&config()).await.expect("connect");

    let err = conn.query("SELEC 1").await.unwrap_err();
    assert_eq!(err.server_error().map(|e| e.code), Some(1064));

    conn.ping().await.expect("ping after error");
    conn.close().await.expect("close");
}
