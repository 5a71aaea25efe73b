use std::{
    env::{self, VarError},
    time::Instant,
};

use rearch::{CData, CapsuleHandle, Container};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DbConn, DbErr, Schema};
use tracing::{info, instrument, warn};

use crate::orm::link;

/// # Errors
/// Will return [`Err`] if the connection to the database fails,
/// or if the `links` table could not be created.
#[instrument]
pub async fn init_container() -> anyhow::Result<Container> {
    info!("Initializing container");
    let container = Container::new();

    let (db_connection_options, set_db_conn, _) = container.read((
        db_connection_options_capsule,
        db_conn_init_action,
        started_at_capsule,
    ));

    info!(?db_connection_options, "Connecting to database");
    let db = Database::connect(db_connection_options).await?;
    create_links_table(&db).await?;
    set_db_conn(db);

    info!("Container initialized");
    Ok(container)
}

async fn create_links_table(db: &DbConn) -> Result<(), DbErr> {
    let create_table = Schema::new(db.get_database_backend())
        .create_table_from_entity(link::Entity)
        .if_not_exists()
        .to_owned();
    db.execute(&create_table).await?;
    info!("Ensured links table exists");
    Ok(())
}

/// # Panics
/// Panics when environment variable is not set or is invalid.
#[must_use]
pub fn db_connection_options_capsule(_: CapsuleHandle) -> ConnectOptions {
    const ENV_VAR_NAME: &str = "DB_URL";
    env::var(ENV_VAR_NAME)
        .unwrap_or_else(|err| match err {
            VarError::NotPresent => panic!("{ENV_VAR_NAME} is not set"),
            VarError::NotUnicode(actual) => {
                panic!("{ENV_VAR_NAME} is invalid unicode: {}", actual.display());
            }
        })
        .into()
}

fn db_conn_manager(
    CapsuleHandle { register, .. }: CapsuleHandle,
) -> (Option<DbConn>, impl use<> + CData + Fn(Option<DbConn>)) {
    register.register(rearch_effects::state::<rearch_effects::Cloned<_>>(None))
}

pub fn db_conn_init_action(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> impl use<> + CData + Fn(DbConn) {
    let set_db_conn = get.as_ref(db_conn_manager).1.clone();
    move |db| set_db_conn(Some(db))
}

/// # Panics
/// Panics when the [`DbConn`] was not set via [`db_conn_init_action`].
pub fn db_conn_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> DbConn {
    let db_conn = get.as_ref(db_conn_manager).0.clone();
    db_conn.expect("DbConn should've been set via db_conn_init_action!")
}

/// The moment this capsule was first read; the service's start time.
#[must_use]
pub fn started_at_capsule(_: CapsuleHandle) -> Instant {
    Instant::now()
}

/// # Panics
/// Panics when environment variable is invalid.
pub fn addr_capsule(_: CapsuleHandle) -> String {
    const ENV_VAR_NAME: &str = "ADDR";
    const DEFAULT_ADDR: &str = "127.0.0.1:0";

    match env::var(ENV_VAR_NAME) {
        Ok(addr) => {
            info!(addr, "{ENV_VAR_NAME} environment variable set");
            addr
        }
        Err(VarError::NotPresent) => {
            warn!(
                addr = DEFAULT_ADDR,
                "{ENV_VAR_NAME} environment variable not set; defaulting to {DEFAULT_ADDR}"
            );
            DEFAULT_ADDR.to_string()
        }
        Err(VarError::NotUnicode(actual)) => {
            panic!(
                "{ENV_VAR_NAME} environment variable is invalid: {}",
                actual.display()
            );
        }
    }
}
