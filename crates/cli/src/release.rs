//! Built-in plan for the current release
//!
//! Used by `idem migrate run` and `idem migrate status` when no `--plan` file
//! is given. The SQL is kept to the subset PostgreSQL and MySQL share.

use idem_migrate::{MigrateResult, MigrationPlan, MigrationStep, PreconditionCheck};

pub fn release_plan() -> MigrateResult<MigrationPlan> {
    MigrationPlan::new(vec![
        MigrationStep::new("create_audit_log")
            .skip_if(PreconditionCheck::table_exists("audit_log"))
            .sql(
                "CREATE TABLE audit_log (
                    id BIGINT NOT NULL PRIMARY KEY,
                    actor VARCHAR(64) NOT NULL,
                    action VARCHAR(128) NOT NULL,
                    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                );",
            ),
        MigrationStep::new("add_users_nickname")
            .skip_if(PreconditionCheck::column_exists("users", "nickname"))
            .sql("ALTER TABLE users ADD COLUMN nickname VARCHAR(64);"),
        MigrationStep::new("backfill_users_nickname")
            .skip_if(
                PreconditionCheck::query_returns_rows(
                    "SELECT 1 FROM users WHERE nickname IS NULL LIMIT 1",
                )
                .negate(),
            )
            .statement("UPDATE users SET nickname = COALESCE(name, '') WHERE nickname IS NULL")
            .transactional(true),
        // No precondition: a duplicate index name is reported as already applied
        MigrationStep::new("index_users_nickname")
            .statement("CREATE INDEX idx_users_nickname ON users (nickname)"),
    ])
}
