use dotenvy::dotenv;
use gravis_ai::db;
use sqlx::Row;

const DEMO_EMAIL: &str = "user@example.com";
const DEMO_NAME: &str = "Architect User";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // DIRECT_URL bypasses a pooler when one sits in front of the database
    let database_url = std::env::var("DIRECT_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| "DATABASE_URL must be set in .env file")?;

    let pool = db::create_pool(&database_url).await?;

    // Existing demo user is left untouched
    let row = sqlx::query(
        "INSERT INTO users (id, email, name, created_at, updated_at)
         VALUES ($1, $2, $3, NOW(), NOW())
         ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
         RETURNING id, email, name",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(DEMO_EMAIL)
    .bind(DEMO_NAME)
    .fetch_one(&pool)
    .await?;

    let id: String = row.get("id");
    let email: String = row.get("email");
    let name: Option<String> = row.get("name");

    println!("🌱 Seeded user");
    println!("   ID: {}", id);
    println!("   Email: {}", email);
    println!("   Name: {}", name.unwrap_or_default());

    pool.close().await;
    Ok(())
}
