//! Wiring and argument helpers for the `babybill` binary

use anyhow::{anyhow, Context};
use babybill_core::models::{ItemField, ManualItem, ReceiptField};
use babybill_core::Config;
use babybill_db::{
    setup_database, MemoryReceiptStore, MemoryUsernameDirectory, PgReceiptRepository,
    ProfileRepository, ReceiptStore, UsernameDirectory,
};
use babybill_ocr::{create_ocr_service, OcrService};
use babybill_services::{DuplicateGuard, ImageAccess, UsernameChecker};
use babybill_storage::{create_storage, Storage};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const OWNER_ENV: &str = "BABYBILL_OWNER_ID";

/// Initialize tracing for the CLI.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("babybill=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Collaborators built from configuration
pub struct App {
    pub config: Config,
    pub receipts: Arc<dyn ReceiptStore>,
    pub usernames: Arc<dyn UsernameDirectory>,
    /// Present only with a database
    pub profiles: Option<ProfileRepository>,
    pub storage: Arc<dyn Storage>,
    pub ocr: Arc<dyn OcrService>,
}

impl App {
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        config.validate()?;

        let (receipts, usernames, profiles): (
            Arc<dyn ReceiptStore>,
            Arc<dyn UsernameDirectory>,
            Option<ProfileRepository>,
        ) = match &config.database_url {
            Some(url) => {
                let pool = setup_database(url, config.db_max_connections).await?;
                let profiles = ProfileRepository::new(pool.clone());
                (
                    Arc::new(PgReceiptRepository::new(pool)),
                    Arc::new(profiles.clone()),
                    Some(profiles),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, records are kept in memory for this run only");
                (
                    Arc::new(MemoryReceiptStore::new()),
                    Arc::new(MemoryUsernameDirectory::default()),
                    None,
                )
            }
        };

        let storage = create_storage(&config)
            .await
            .context("Failed to initialize receipt image storage")?;
        let ocr = create_ocr_service(&config)?;

        tracing::info!(
            environment = %config.environment,
            storage = %storage.backend_type(),
            ocr = ocr.name(),
            "BabyBill initialized"
        );

        Ok(Self {
            config,
            receipts,
            usernames,
            profiles,
            storage,
            ocr,
        })
    }

    pub fn duplicate_guard(&self) -> DuplicateGuard {
        DuplicateGuard::new(self.receipts.clone())
    }

    pub fn image_access(&self) -> ImageAccess {
        ImageAccess::with_ttl(
            self.storage.clone(),
            Duration::from_secs(self.config.signed_url_ttl_secs),
        )
    }

    pub fn username_checker(&self) -> UsernameChecker {
        UsernameChecker::with_debounce(
            self.usernames.clone(),
            Duration::from_millis(self.config.username_check_debounce_ms),
        )
    }

    pub fn profiles(&self) -> anyhow::Result<&ProfileRepository> {
        self.profiles
            .as_ref()
            .ok_or_else(|| anyhow!("Profiles need a database, set DATABASE_URL"))
    }
}

/// Owner from `--owner`, falling back to the environment.
pub fn resolve_owner(flag: Option<Uuid>, env_value: Option<String>) -> anyhow::Result<Uuid> {
    if let Some(owner) = flag {
        return Ok(owner);
    }
    let raw = env_value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("Pass --owner or set {}", OWNER_ENV))?;
    Uuid::parse_str(raw.trim()).with_context(|| format!("{} is not a UUID", OWNER_ENV))
}

/// `store_name=Costco` → (field, value)
pub fn parse_field_assignment(input: &str) -> anyhow::Result<(ReceiptField, String)> {
    let (field, value) = input
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected FIELD=VALUE, got '{}'", input))?;
    Ok((field.parse()?, value.to_string()))
}

/// `1.price=3.49` → (index, field, value)
pub fn parse_item_assignment(input: &str) -> anyhow::Result<(usize, ItemField, String)> {
    let (target, value) = input
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected INDEX.FIELD=VALUE, got '{}'", input))?;
    let (index, field) = target
        .split_once('.')
        .ok_or_else(|| anyhow!("Expected INDEX.FIELD=VALUE, got '{}'", input))?;
    let index = index
        .trim()
        .parse::<usize>()
        .with_context(|| format!("Invalid item index in '{}'", input))?;
    Ok((index, field.parse()?, value.to_string()))
}

/// `Milk:3.49:2` → manual item row; price and quantity may be omitted.
pub fn parse_item_row(input: &str) -> ManualItem {
    let mut parts = input.splitn(3, ':');
    ManualItem {
        name: parts.next().unwrap_or_default().to_string(),
        price: parts.next().unwrap_or_default().to_string(),
        quantity: parts.next().unwrap_or_default().to_string(),
    }
}

/// Answer to a yes/no prompt; anything but `y`/`yes` declines.
pub fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_owner() {
        let id = Uuid::new_v4();
        assert_eq!(resolve_owner(Some(id), None).unwrap(), id);
        assert_eq!(resolve_owner(None, Some(format!(" {} ", id))).unwrap(), id);
        assert!(resolve_owner(None, Some("   ".to_string())).is_err());
        assert!(resolve_owner(None, Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_field_assignment() {
        let (field, value) = parse_field_assignment("store_name=Costco Wholesale").unwrap();
        assert_eq!(field, ReceiptField::MerchantName);
        assert_eq!(value, "Costco Wholesale");

        let (field, value) = parse_field_assignment("notes=a=b").unwrap();
        assert_eq!(field, ReceiptField::Notes);
        assert_eq!(value, "a=b");

        assert!(parse_field_assignment("store_name").is_err());
        assert!(parse_field_assignment("colour=red").is_err());
    }

    #[test]
    fn test_item_assignment() {
        let (index, field, value) = parse_item_assignment("1.price=3.49").unwrap();
        assert_eq!((index, field, value.as_str()), (1, ItemField::UnitPrice, "3.49"));
        assert!(parse_item_assignment("x.price=1").is_err());
        assert!(parse_item_assignment("1=2").is_err());
    }

    #[test]
    fn test_confirmation() {
        assert!(is_confirmation("y\n"));
        assert!(is_confirmation(" YES "));
        assert!(!is_confirmation(""));
        assert!(!is_confirmation("n"));
        assert!(!is_confirmation("yep"));
    }

    #[test]
    fn test_item_row() {
        let item = parse_item_row("Milk:3.49:2");
        assert_eq!((item.name.as_str(), item.price.as_str(), item.quantity.as_str()), ("Milk", "3.49", "2"));

        let bare = parse_item_row("Bread");
        assert_eq!(bare.name, "Bread");
        assert!(bare.price.is_empty());
    }
}
