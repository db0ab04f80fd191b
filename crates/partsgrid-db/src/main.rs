//! Operator CLI for the partsgrid schema layer.
//!
//! Usage:
//!   partsgrid-db migrate [--to VERSION]          - apply pending migrations
//!   partsgrid-db status                          - show the migration ledger
//!   partsgrid-db verify                          - run read-only diagnostics
//!   partsgrid-db revert [--steps N] [--allow-data-loss]
//!   partsgrid-db seed                            - seed legacy-shape demo data
//!
//! Reads the connection string from `DATABASE_URL` (a `.env` file is picked
//! up if present). `verify` is the manual gate between the additive and
//! destructive phases: read its output before continuing.

use owo_colors::OwoColorize;
use partsgrid_db::migrations::{
    AMBIGUOUS_ORDER_ITEMS_SQL, ENRICHED_GATE, PLACEHOLDER_NAME, UNMATCHED_ORDER_ITEMS_SQL,
};
use regrade::{MigrationRunner, Phase, RevertOptions, guard, verify};
use tokio_postgres::{Client, NoTls};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("help");

    let rt = tokio::runtime::Runtime::new()?;
    match command {
        "migrate" => rt.block_on(migrate(flag_value(&args, "--to"))),
        "status" => rt.block_on(status()),
        "verify" => rt.block_on(run_verify()),
        "revert" => {
            let steps = flag_value(&args, "--steps")
                .map(|s| s.parse::<usize>())
                .transpose()?
                .unwrap_or(1);
            let allow_data_loss = args.iter().any(|a| a == "--allow-data-loss");
            rt.block_on(revert(steps, allow_data_loss))
        }
        "seed" => rt.block_on(seed()),
        _ => {
            eprintln!("usage: partsgrid-db <migrate|status|verify|revert|seed>");
            std::process::exit(2);
        }
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

async fn connect() -> Result<Client, Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/partsgrid".to_string());

    let (client, connection) = tokio_postgres::connect(&database_url, NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {e}");
        }
    });
    Ok(client)
}

async fn migrate(upto: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connect().await?;
    let mut runner = MigrationRunner::new(&mut client);
    let ran = runner.migrate_to(upto).await?;
    if ran.is_empty() {
        println!("nothing to do, schema is up to date");
    } else {
        for version in &ran {
            println!("{} {}", "applied".green(), version);
        }
    }
    Ok(())
}

async fn status() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connect().await?;
    let runner = MigrationRunner::new(&mut client);
    for entry in runner.status().await? {
        let marker = if entry.applied {
            "applied".green().to_string()
        } else {
            "pending".yellow().to_string()
        };
        let phase = match entry.phase {
            Phase::Additive => "additive",
            Phase::Destructive => "destructive",
        };
        println!("{marker}  {}  {} ({phase})", entry.version, entry.name);
        if !entry.applied
            && let Some(note) = entry.revert_note
        {
            println!("         revert discards data: {note}");
        }
    }
    Ok(())
}

async fn run_verify() -> Result<(), Box<dyn std::error::Error>> {
    let client = connect().await?;

    for table in ["shops", "products", "shop_products", "orders", "order_items"] {
        if guard::table_exists(&client, table).await? {
            let count = verify::row_count(&client, table).await?;
            println!("{count:>8}  {table}");
        }
    }
    println!();

    if guard::column_exists(&client, "shop_products", "name").await? {
        let placeholders = ENRICHED_GATE.blocked_rows(&client).await?;
        report("shop products awaiting enrichment", placeholders, PLACEHOLDER_NAME);

        let duplicates =
            verify::duplicate_slugs(&client, "shop_products", "shop_id", "slug").await?;
        if duplicates.is_empty() {
            println!("{}  no duplicate (shop, slug) pairs", "ok".green());
        } else {
            println!("{}  duplicate (shop, slug) pairs:", "!!".red());
            for dup in duplicates {
                println!("      shop {}  slug {:?}  x{}", dup.scope, dup.slug, dup.count);
            }
        }
    }

    // The legacy key columns are gone after finalization, and these
    // diagnostics with them.
    if guard::column_exists(&client, "order_items", "product_id").await? {
        if guard::column_exists(&client, "order_items", "shop_product_id").await? {
            let unmatched = verify::pending_count(&client, UNMATCHED_ORDER_ITEMS_SQL).await?;
            let ambiguous = verify::pending_count(&client, AMBIGUOUS_ORDER_ITEMS_SQL).await?;
            report("order items with no re-key candidate", unmatched as u64, "");
            report("order items with several candidates", ambiguous as u64, "");
        }
    } else {
        println!("{}  order items finalized on shop_product_id", "ok".green());
    }

    Ok(())
}

fn report(what: &str, count: u64, detail: &str) {
    if count == 0 {
        println!("{}  no {what}", "ok".green());
    } else if detail.is_empty() {
        println!("{}  {count} {what}", "!!".red());
    } else {
        println!("{}  {count} {what} ({detail})", "!!".red());
    }
}

async fn revert(steps: usize, allow_data_loss: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connect().await?;
    let mut runner = MigrationRunner::new(&mut client);
    let reverted = runner
        .revert(steps, RevertOptions { allow_data_loss })
        .await?;
    for version in &reverted {
        println!("{} {}", "reverted".yellow(), version);
    }
    Ok(())
}

/// Seed legacy-shape demo data. Run right after
/// `migrate --to 2024_10_01_000000` to exercise the full pipeline.
async fn seed() -> Result<(), Box<dyn std::error::Error>> {
    let client = connect().await?;

    println!("seeding legacy-shape demo data...");

    client
        .execute(
            r#"
INSERT INTO users (id, email, full_name, hashed_password)
VALUES
    ('00000000-0000-0000-0000-000000000001', 'ana@partsgrid.test', 'Ana Ferreira', 'x'),
    ('00000000-0000-0000-0000-000000000002', 'joao@partsgrid.test', 'Joao Mendes', 'x')
ON CONFLICT (id) DO NOTHING
"#,
            &[],
        )
        .await?;

    client
        .execute(
            r#"
INSERT INTO shops (id, owner_id, name, slug)
VALUES
    ('00000000-0000-0000-0000-000000000101', '00000000-0000-0000-0000-000000000001', 'Luanda Auto Parts', 'luanda-auto-parts'),
    ('00000000-0000-0000-0000-000000000102', '00000000-0000-0000-0000-000000000002', 'Benguela Motors', 'benguela-motors')
ON CONFLICT (id) DO NOTHING
"#,
            &[],
        )
        .await?;

    client
        .execute(
            r#"
INSERT INTO products (id, name, oe_number, brand, price, image)
VALUES
    ('00000000-0000-0000-0000-000000000201', 'Brake Pad', 'OE-4451', 'Bosch', 45.00, 'data:image/png;base64,cGFk'),
    ('00000000-0000-0000-0000-000000000202', 'Oil Filter', 'OE-1188', 'Mann', 12.50, NULL),
    ('00000000-0000-0000-0000-000000000203', 'Spark Plug Set', 'OE-7730', 'NGK', 28.00, NULL)
ON CONFLICT (id) DO NOTHING
"#,
            &[],
        )
        .await?;

    client
        .execute(
            r#"
INSERT INTO shop_products (id, shop_id, product_id, stock_quantity, price)
VALUES
    ('00000000-0000-0000-0000-000000000301', '00000000-0000-0000-0000-000000000101', '00000000-0000-0000-0000-000000000201', 12, 47.50),
    ('00000000-0000-0000-0000-000000000302', '00000000-0000-0000-0000-000000000101', '00000000-0000-0000-0000-000000000202', 40, NULL),
    ('00000000-0000-0000-0000-000000000303', '00000000-0000-0000-0000-000000000102', '00000000-0000-0000-0000-000000000201', 5, 44.00)
ON CONFLICT (id) DO NOTHING
"#,
            &[],
        )
        .await?;

    client
        .execute(
            r#"
INSERT INTO orders (id, user_id, order_number, total_amount, shipping_address, billing_address, payment_method)
VALUES
    ('00000000-0000-0000-0000-000000000401', '00000000-0000-0000-0000-000000000002', 'PG-2024-0001', 95.00, 'Rua A, Luanda', 'Rua A, Luanda', 'bank_transfer')
ON CONFLICT (id) DO NOTHING
"#,
            &[],
        )
        .await?;

    client
        .execute(
            r#"
INSERT INTO order_items (id, order_id, product_id, shop_id, quantity, unit_price)
VALUES
    ('00000000-0000-0000-0000-000000000501', '00000000-0000-0000-0000-000000000401', '00000000-0000-0000-0000-000000000201', '00000000-0000-0000-0000-000000000101', 2, 47.50)
ON CONFLICT (id) DO NOTHING
"#,
            &[],
        )
        .await?;

    println!("  2 users, 2 shops, 3 products, 3 shop products, 1 order");
    Ok(())
}
