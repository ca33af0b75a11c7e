use dotenvy::dotenv;
use gravis_ai::services::password;
use sqlx::{postgres::PgPoolOptions, Row};
use std::io::{self, Write};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🏛️  Gravis AI - Create User");
    println!("==========================================");

    dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set in .env file")?;

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;

    print!("Email address: ");
    io::stdout().flush()?;
    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    let email = email.trim().to_lowercase();

    if email.is_empty() || !email.contains('@') {
        eprintln!("❌ Invalid email address");
        return Ok(());
    }

    print!("Name: ");
    io::stdout().flush()?;
    let mut name = String::new();
    io::stdin().read_line(&mut name)?;
    let name = name.trim().to_string();

    if name.is_empty() {
        eprintln!("❌ Name cannot be empty");
        return Ok(());
    }

    let existing_user = sqlx::query("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&pool)
        .await?;

    if existing_user.is_some() {
        eprintln!("❌ User with this email already exists");
        return Ok(());
    }

    print!("Password: ");
    io::stdout().flush()?;
    let password = rpassword::read_password()?;

    if let Err(violation) = password::check_policy(&password) {
        eprintln!("❌ {}", violation.message());
        return Ok(());
    }

    print!("Password (again): ");
    io::stdout().flush()?;
    let password_confirm = rpassword::read_password()?;

    if password != password_confirm {
        eprintln!("❌ Passwords don't match");
        return Ok(());
    }

    let password_hash = password::hash_password(&password)?;

    let result = sqlx::query(
        "INSERT INTO users (id, email, name, password_hash, created_at, updated_at)
         VALUES ($1, $2, $3, $4, NOW(), NOW())
         RETURNING id, email",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&email)
    .bind(&name)
    .bind(&password_hash)
    .fetch_one(&pool)
    .await;

    match result {
        Ok(row) => {
            let id: String = row.get("id");
            let email: String = row.get("email");

            println!();
            println!("✅ User created successfully!");
            println!("   ID: {}", id);
            println!("   Name: {}", name);
            println!("   Email: {}", email);
            println!();
            println!("🔐 Sign in at /auth/signin with the credentials you just created");
        }
        Err(e) => {
            eprintln!("❌ Failed to create user: {}", e);
        }
    }

    pool.close().await;
    Ok(())
}
