//! Throwaway Postgres databases for cache backend tests.
//!
//! Each `TestDatabase` owns a freshly created database named `orca_test_<uuid>`. Call `cleanup`
//! at the end of a test. A database that is never cleaned up is dropped on `Drop`.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection,
	postgres::{PgConnectOptions, PgConnection},
};
use uuid::Uuid;

/// Environment variable holding the server DSN used to create test databases.
pub const DSN_VAR: &str = "ORCA_PG_DSN";

// Tried in order when opening the maintenance connection.
const MAINTENANCE_DATABASES: [&str; 2] = ["postgres", "template1"];

pub struct TestDatabase {
	name: String,
	dsn: String,
	maintenance: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	pub async fn new(server_dsn: &str) -> Result<Self> {
		let server = PgConnectOptions::from_str(server_dsn)
			.map_err(|err| Error::Message(format!("{DSN_VAR} is not a Postgres DSN: {err}.")))?;
		let (maintenance, mut conn) = open_maintenance(&server).await?;
		let name = format!("orca_test_{}", Uuid::new_v4().simple());

		sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&name)))
			.execute(&mut conn)
			.await
			.map_err(|err| Error::Message(format!("Could not create {name}: {err}.")))?;
		conn.close().await?;

		let dsn = server.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, maintenance, dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn cleanup(mut self) -> Result<()> {
		drop_database(&self.maintenance, &self.name).await?;

		self.dropped = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let maintenance = self.maintenance.clone();
		let name = self.name.clone();
		// The owning test runtime may be shutting down, so cleanup runs on a private one.
		let handle = thread::spawn(move || {
			let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

			runtime.block_on(drop_database(&maintenance, &name))
		});

		match handle.join() {
			Ok(Ok(())) => {},
			Ok(Err(err)) => eprintln!("Leaked test database {}: {err}.", self.name),
			Err(_) => eprintln!("Leaked test database {}: cleanup thread panicked.", self.name),
		}
	}
}

/// The configured server DSN, when set and non-blank.
pub fn env_dsn() -> Option<String> {
	env::var(DSN_VAR).ok().filter(|dsn| !dsn.trim().is_empty())
}

async fn open_maintenance(server: &PgConnectOptions) -> Result<(PgConnectOptions, PgConnection)> {
	let mut failures = Vec::new();

	for database in MAINTENANCE_DATABASES {
		let options = server.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => failures.push(format!("{database}: {err}")),
		}
	}

	Err(Error::Message(format!("No maintenance database is reachable ({}).", failures.join("; "))))
}

async fn drop_database(maintenance: &PgConnectOptions, name: &str) -> Result<()> {
	let mut conn = PgConnection::connect_with(maintenance).await?;

	sqlx::query(&format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", quote_ident(name)))
		.execute(&mut conn)
		.await
		.map_err(|err| Error::Message(format!("Could not drop {name}: {err}.")))?;
	conn.close().await?;

	Ok(())
}

fn quote_ident(ident: &str) -> String {
	format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identifiers_are_quoted() {
		assert_eq!(quote_ident("orca_test_1"), "\"orca_test_1\"");
		assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
	}
}
