use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, bail};
use clap::Parser;
use server::config::{UserEntry, Users};

/// Hashes a password and merges the user into a local `SURVEY_USERS` file.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    username: String,

    password: String,

    #[arg(long)]
    name: Option<String>,

    #[arg(long, default_value = "")]
    email: String,

    #[arg(long, default_value = "../users.json")]
    path: PathBuf,

    #[arg(long, default_value_t = bcrypt::DEFAULT_COST)]
    cost: u32,
}

/// Existing users at `path`. Only a missing file starts an empty set; any other read
/// error stops the run before the file is rewritten.
fn load_users(path: &Path) -> anyhow::Result<Users> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Users::new()),
        Err(e) => bail!("Failed to read {}: {e}", path.display()),
    };

    let users = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a users file", path.display()))?;
    Ok(users)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut users = load_users(&args.path)?;

    let replaced = users
        .insert(
            args.username.clone(),
            UserEntry {
                name: args.name,
                email: args.email,
                password: bcrypt::hash(&args.password, args.cost)?,
            },
        )
        .is_some();

    fs::write(&args.path, serde_json::to_string_pretty(&users)?)?;

    println!(
        "{} {} in {}",
        if replaced { "Updated" } else { "Added" },
        args.username,
        args.path.display()
    );
    println!("Users: {}", users.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    const USERS: &str = r#"{
        "bayi1": {"name": "Bayi Bir", "email": "bayi1@example.com", "password": "$2b$04$a"},
        "bayi2": {"password": "$2b$04$b"}
    }"#;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        assert!(load_users(&dir.path().join("users.json")).unwrap().is_empty());
    }

    #[test]
    fn test_existing_users() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, USERS).unwrap();

        let users = load_users(&path).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users["bayi1"].name.as_deref(), Some("Bayi Bir"));
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        let mut bytes = USERS.as_bytes().to_vec();
        bytes.push(0xff);
        fs::write(&path, &bytes).unwrap();

        assert!(load_users(&path).is_err());
        assert!(load_users(dir.path()).is_err());
        assert_eq!(fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "[]").unwrap();

        assert!(load_users(&path).is_err());
    }
}
