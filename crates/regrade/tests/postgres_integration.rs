//! Integration tests using testcontainers with Postgres 18.

use regrade::{
    BackfillOutcome, Error, Gate, MigrationContext, MigrationRunner, Phase, Result, RevertOptions,
    SlugScope, finalize, guard, run_backfill, slug,
};
use testcontainers::{ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio_postgres::NoTls;
use uuid::Uuid;

// Test migrations registered for this binary. Each test runs against its own
// container, so the set is shared but the ledger state is not.

async fn create_widgets(ctx: &MigrationContext<'_>) -> Result<()> {
    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS widgets (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name TEXT NOT NULL,
    price INTEGER
)
"#,
    )
    .await?;
    Ok(())
}

async fn drop_widgets(ctx: &MigrationContext<'_>) -> Result<()> {
    ctx.execute("DROP TABLE IF EXISTS widgets").await?;
    Ok(())
}

regrade::register_migration! {
    version: "0001",
    name: "create-widgets",
    phase: Phase::Additive,
    apply: create_widgets,
    revert: drop_widgets,
}

async fn add_widget_slug(ctx: &MigrationContext<'_>) -> Result<()> {
    ctx.add_column_if_absent("widgets", "slug", "TEXT").await?;
    ctx.create_index_if_absent(
        "idx_widgets_slug",
        "CREATE INDEX idx_widgets_slug ON widgets (slug)",
    )
    .await?;
    Ok(())
}

// Deliberately has no revert.
regrade::register_migration! {
    version: "0002",
    name: "add-widget-slug",
    phase: Phase::Additive,
    apply: add_widget_slug,
}

async fn backfill_widget_slugs(ctx: &MigrationContext<'_>) -> Result<()> {
    ctx.execute("UPDATE widgets SET slug = lower(name) WHERE slug IS NULL")
        .await?;
    Ok(())
}

async fn clear_widget_slugs(ctx: &MigrationContext<'_>) -> Result<()> {
    ctx.execute("UPDATE widgets SET slug = NULL").await?;
    Ok(())
}

regrade::register_migration! {
    version: "0003",
    name: "backfill-widget-slugs",
    phase: Phase::Additive,
    apply: backfill_widget_slugs,
    revert: clear_widget_slugs,
    revert_note: "clears every widget slug, including manual edits",
}

async fn create_postgres_container() -> (
    testcontainers::ContainerAsync<Postgres>,
    tokio_postgres::Client,
) {
    let container = Postgres::default()
        .with_tag("18")
        .start()
        .await
        .expect("Failed to start Postgres container");

    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();

    let connection_string = format!(
        "host={} port={} user=postgres password=postgres dbname=postgres",
        host, port
    );

    let (client, connection) = tokio_postgres::connect(&connection_string, NoTls)
        .await
        .expect("Failed to connect to Postgres");

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("Connection error: {}", e);
        }
    });

    (container, client)
}

#[tokio::test]
async fn test_migrate_records_ledger_and_is_idempotent() {
    let (_container, mut client) = create_postgres_container().await;
    let mut runner = MigrationRunner::new(&mut client);

    let ran = runner.migrate().await.expect("migrate failed");
    assert_eq!(ran, vec!["0001", "0002", "0003"]);

    // Second invocation finds nothing pending.
    let ran = runner.migrate().await.expect("re-migrate failed");
    assert!(ran.is_empty());

    let rows = client
        .query(
            "SELECT version, name FROM _regrade_migrations ORDER BY version",
            &[],
        )
        .await
        .expect("Failed to query ledger");
    assert_eq!(rows.len(), 3);
    let first_name: &str = rows[0].get(1);
    assert_eq!(first_name, "create-widgets");

    assert!(guard::table_exists(&client, "widgets").await.unwrap());
    assert!(
        guard::column_exists(&client, "widgets", "slug")
            .await
            .unwrap()
    );
    assert!(guard::index_exists(&client, "idx_widgets_slug").await.unwrap());
}

#[tokio::test]
async fn test_migrate_to_stops_at_version() {
    let (_container, mut client) = create_postgres_container().await;
    let mut runner = MigrationRunner::new(&mut client);

    let ran = runner.migrate_to(Some("0001")).await.expect("migrate failed");
    assert_eq!(ran, vec!["0001"]);
    assert!(
        !guard::column_exists(&client, "widgets", "slug")
            .await
            .unwrap()
    );

    // Data inserted between phases survives the rest of the run.
    client
        .execute("INSERT INTO widgets (name) VALUES ('Gear')", &[])
        .await
        .unwrap();

    let mut runner = MigrationRunner::new(&mut client);
    let ran = runner.migrate().await.expect("migrate failed");
    assert_eq!(ran, vec!["0002", "0003"]);

    let row = client
        .query_one("SELECT slug FROM widgets WHERE name = 'Gear'", &[])
        .await
        .unwrap();
    let slug: &str = row.get(0);
    assert_eq!(slug, "gear");
}

#[tokio::test]
async fn test_revert_refuses_data_loss_unless_allowed() {
    let (_container, mut client) = create_postgres_container().await;
    let mut runner = MigrationRunner::new(&mut client);
    runner.migrate().await.expect("migrate failed");

    // 0003 carries a revert note, so the default refuses.
    let err = runner
        .revert(1, RevertOptions::default())
        .await
        .expect_err("lossy revert should be refused");
    assert!(matches!(err, Error::LossyRevert { ref version, .. } if version == "0003"));

    let reverted = runner
        .revert(1, RevertOptions { allow_data_loss: true })
        .await
        .expect("revert failed");
    assert_eq!(reverted, vec!["0003"]);

    let applied = runner.applied().await.unwrap();
    assert_eq!(applied, vec!["0001", "0002"]);

    // 0002 has no revert at all.
    let err = runner
        .revert(1, RevertOptions { allow_data_loss: true })
        .await
        .expect_err("irreversible migration should be refused");
    assert!(matches!(err, Error::IrreversibleMigration { ref version } if version == "0002"));
}

#[tokio::test]
async fn test_failed_migration_rolls_back_and_stops() {
    let (_container, mut client) = create_postgres_container().await;
    let mut runner = MigrationRunner::new(&mut client);
    runner.migrate_to(Some("0001")).await.expect("migrate failed");

    // Pre-create the slug column with an incompatible type. 0002's
    // add-if-absent guard accepts it as-is, then 0003's text backfill fails.
    client
        .execute("ALTER TABLE widgets ADD COLUMN slug INTEGER", &[])
        .await
        .unwrap();
    client
        .execute("INSERT INTO widgets (name) VALUES ('Bolt')", &[])
        .await
        .unwrap();

    let mut runner = MigrationRunner::new(&mut client);
    runner.migrate().await.expect_err("0003 should fail on the type mismatch");

    // 0002 committed, 0003 rolled back: the ledger is the high-water mark.
    let applied = runner.applied().await.unwrap();
    assert_eq!(applied, vec!["0001", "0002"]);
    let row = client
        .query_one("SELECT slug FROM widgets WHERE name = 'Bolt'", &[])
        .await
        .unwrap();
    let slug: Option<i32> = row.get(0);
    assert_eq!(slug, None);
}

#[tokio::test]
async fn test_slug_allocation_probes_for_free_suffix() {
    let (_container, client) = create_postgres_container().await;

    client
        .batch_execute(
            r#"
            CREATE TABLE catalog_items (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                shop_id UUID NOT NULL,
                slug TEXT NOT NULL,
                UNIQUE (shop_id, slug)
            );
            "#,
        )
        .await
        .expect("Failed to create table");

    const SCOPE: SlugScope<'static> = SlugScope {
        table: "catalog_items",
        scope_column: "shop_id",
        slug_column: "slug",
        id_column: "id",
    };
    let shop_a = Uuid::new_v4();
    let shop_b = Uuid::new_v4();

    // Fresh scope: base slug is free.
    let slug = slug::allocate(&client, &SCOPE, &shop_a, "Oil Filter!!", None, None)
        .await
        .unwrap();
    assert_eq!(slug, "oil-filter");
    client
        .execute(
            "INSERT INTO catalog_items (shop_id, slug) VALUES ($1, $2)",
            &[&shop_a, &slug],
        )
        .await
        .unwrap();

    // Same name in the same scope probes upward.
    let slug = slug::allocate(&client, &SCOPE, &shop_a, "Oil Filter!!", None, None)
        .await
        .unwrap();
    assert_eq!(slug, "oil-filter-1");
    client
        .execute(
            "INSERT INTO catalog_items (shop_id, slug) VALUES ($1, $2)",
            &[&shop_a, &slug],
        )
        .await
        .unwrap();

    let slug = slug::allocate(&client, &SCOPE, &shop_a, "Oil Filter!!", None, None)
        .await
        .unwrap();
    assert_eq!(slug, "oil-filter-2");

    // A different scope is independent.
    let slug = slug::allocate(&client, &SCOPE, &shop_b, "Oil Filter!!", None, None)
        .await
        .unwrap();
    assert_eq!(slug, "oil-filter");

    // A caller-supplied candidate wins over the derived base.
    let slug = slug::allocate(&client, &SCOPE, &shop_a, "Oil Filter!!", Some("premium-filter"), None)
        .await
        .unwrap();
    assert_eq!(slug, "premium-filter");

    // A name that slugifies to nothing falls back.
    let slug = slug::allocate(&client, &SCOPE, &shop_b, "!!!", None, None)
        .await
        .unwrap();
    assert_eq!(slug, "untitled");
}

#[tokio::test]
async fn test_slug_allocation_excludes_own_row_on_update() {
    let (_container, client) = create_postgres_container().await;

    client
        .batch_execute(
            r#"
            CREATE TABLE catalog_items (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                shop_id UUID NOT NULL,
                slug TEXT NOT NULL,
                UNIQUE (shop_id, slug)
            );
            "#,
        )
        .await
        .expect("Failed to create table");

    const SCOPE: SlugScope<'static> = SlugScope {
        table: "catalog_items",
        scope_column: "shop_id",
        slug_column: "slug",
        id_column: "id",
    };
    let shop = Uuid::new_v4();
    let own_id = Uuid::new_v4();
    client
        .execute(
            "INSERT INTO catalog_items (id, shop_id, slug) VALUES ($1, $2, 'brake-pad')",
            &[&own_id, &shop],
        )
        .await
        .unwrap();

    // Renaming a row back to its own slug must not bump the suffix.
    let slug = slug::allocate(&client, &SCOPE, &shop, "Brake Pad", None, Some(own_id))
        .await
        .unwrap();
    assert_eq!(slug, "brake-pad");

    // Another row colliding with it still probes.
    let slug = slug::allocate(&client, &SCOPE, &shop, "Brake Pad", None, None)
        .await
        .unwrap();
    assert_eq!(slug, "brake-pad-1");
}

struct ArchiveTitleRule;

impl regrade::MatchRule for ArchiveTitleRule {
    fn description(&self) -> &str {
        "archive title backfill"
    }

    fn update_sql(&self) -> String {
        r#"
UPDATE archive a
SET title = one.title
FROM (
    SELECT a2.id, min(s.title) AS title
    FROM archive a2
    JOIN source s ON s.ref_code = a2.ref_code
    GROUP BY a2.id
    HAVING count(*) = 1
) one
WHERE one.id = a.id
  AND a.title IS NULL
"#
        .to_string()
    }

    fn unmatched_sql(&self) -> String {
        r#"
SELECT count(*)
FROM archive a
WHERE a.title IS NULL
  AND NOT EXISTS (SELECT 1 FROM source s WHERE s.ref_code = a.ref_code)
"#
        .to_string()
    }

    fn ambiguous_sql(&self) -> Option<String> {
        Some(
            r#"
SELECT count(*)
FROM archive a
WHERE a.title IS NULL
  AND (SELECT count(*) FROM source s WHERE s.ref_code = a.ref_code) > 1
"#
            .to_string(),
        )
    }
}

#[tokio::test]
async fn test_backfill_accounts_for_unmatched_and_ambiguous() {
    let (_container, client) = create_postgres_container().await;

    client
        .batch_execute(
            r#"
            CREATE TABLE source (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                ref_code TEXT NOT NULL,
                title TEXT NOT NULL
            );
            CREATE TABLE archive (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                ref_code TEXT NOT NULL,
                title TEXT
            );

            INSERT INTO source (ref_code, title) VALUES
                ('A', 'Alpha'),
                ('B', 'Bravo'),
                ('B', 'Bravo Two');

            INSERT INTO archive (ref_code) VALUES
                ('A'),   -- exactly one candidate
                ('B'),   -- two candidates, must stay NULL
                ('C');   -- no candidate, must stay NULL
            "#,
        )
        .await
        .expect("Failed to seed");

    let outcome = run_backfill(&client, &ArchiveTitleRule).await.unwrap();
    assert_eq!(
        outcome,
        BackfillOutcome {
            updated: 1,
            unmatched: 1,
            ambiguous: 1,
        }
    );
    assert_eq!(outcome.pending(), 2);

    // The ambiguous row was not assigned arbitrarily.
    let row = client
        .query_one("SELECT title FROM archive WHERE ref_code = 'B'", &[])
        .await
        .unwrap();
    let title: Option<&str> = row.get(0);
    assert_eq!(title, None);

    let row = client
        .query_one("SELECT title FROM archive WHERE ref_code = 'A'", &[])
        .await
        .unwrap();
    let title: Option<&str> = row.get(0);
    assert_eq!(title, Some("Alpha"));

    // Re-running touches nothing and reports the same residue.
    let rerun = run_backfill(&client, &ArchiveTitleRule).await.unwrap();
    assert_eq!(
        rerun,
        BackfillOutcome {
            updated: 0,
            unmatched: 1,
            ambiguous: 1,
        }
    );
}

#[tokio::test]
async fn test_gate_blocks_promotion_until_backfill_completes() {
    let (_container, client) = create_postgres_container().await;

    client
        .batch_execute(
            r#"
            CREATE TABLE parts (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                name TEXT NOT NULL,
                price INTEGER
            );
            INSERT INTO parts (name, price) VALUES ('Bolt', 5), ('Nut', NULL), ('Washer', NULL);
            "#,
        )
        .await
        .expect("Failed to seed");

    const GATE: Gate<'static> = Gate {
        description: "parts without a price",
        blocking_sql: "SELECT count(*) FROM parts WHERE price IS NULL",
    };

    assert_eq!(GATE.blocked_rows(&client).await.unwrap(), 2);
    let err = finalize::promote_not_null(&client, "parts", "price", &GATE)
        .await
        .expect_err("promotion should be blocked");
    assert!(matches!(
        err,
        Error::FinalizationBlocked { blocked_rows: 2, .. }
    ));
    // The column is untouched after the refusal.
    assert!(
        guard::column_is_nullable(&client, "parts", "price")
            .await
            .unwrap()
    );

    client
        .execute("UPDATE parts SET price = 0 WHERE price IS NULL", &[])
        .await
        .unwrap();

    finalize::promote_not_null(&client, "parts", "price", &GATE)
        .await
        .expect("promotion should pass once the gate holds");
    assert!(
        !guard::column_is_nullable(&client, "parts", "price")
            .await
            .unwrap()
    );

    // Dropping a column behind the same gate is now allowed too.
    finalize::drop_column(&client, "parts", "price", &GATE)
        .await
        .unwrap();
    assert!(
        !guard::column_exists(&client, "parts", "price")
            .await
            .unwrap()
    );
}
