use crate::Db;
use crate::error::Result;

const MIGRATION_0001: &str = include_str!("../migrations/0001_init.sql");
const MIGRATION_0002: &str = include_str!("../migrations/0002_add_usage_event.sql");

const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_init", MIGRATION_0001),
    ("0002_add_usage_event", MIGRATION_0002),
];

impl Db {
    /// Applies every migration; safe to run on each start.
    pub fn migrate(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        for (_, sql) in MIGRATIONS {
            tx.execute_batch(sql)?;
        }
        tx.commit()?;
        Ok(())
    }
}
