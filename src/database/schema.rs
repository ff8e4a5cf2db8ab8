// Database schema definitions and migrations
// Applied in order by `Database::run_migrations`.

pub const ACCESS_LOGS_SCHEMA: &str = include_str!("../../migrations/001_access_logs.sql");
pub const RECORDS_SCHEMA: &str = include_str!("../../migrations/002_records.sql");

pub const MIGRATIONS: &[(&str, &str)] = &[
    ("001_access_logs", ACCESS_LOGS_SCHEMA),
    ("002_records", RECORDS_SCHEMA),
];
