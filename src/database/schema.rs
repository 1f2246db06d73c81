// SQL schema for the Prequel database, applied at startup.

pub const INITIAL_SCHEMA: &str = include_str!("../../migrations/001_initial_schema.sql");
