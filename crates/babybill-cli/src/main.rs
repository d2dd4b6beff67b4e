//! BabyBill CLI: scan, enter, browse and edit receipts.
//!
//! Reads configuration from the environment (and `.env`). The acting user is
//! `--owner` or BABYBILL_OWNER_ID.

use anyhow::Context;
use babybill_cli::{
    init_tracing, is_confirmation, parse_field_assignment, parse_item_assignment, parse_item_row,
    resolve_owner, App, OWNER_ENV,
};
use babybill_core::models::{Country, ManualReceiptForm, UserProfile};
use babybill_core::validation::RegistrationForm;
use babybill_core::{AppError, Config, ErrorMetadata, LogLevel};
use babybill_services::{
    CategoryFilter, EditableSession, IngestionPipeline, LedgerView, SaveOutcome, UsernameStatus,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "babybill", about = "Receipt ledger CLI")]
struct Cli {
    /// Acting user (defaults to BABYBILL_OWNER_ID)
    #[arg(long, global = true)]
    owner: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a receipt photo, recognise it and save it
    Scan {
        /// Path to the JPEG photo
        image: PathBuf,
        /// Save without asking if a matching receipt already exists
        #[arg(long)]
        force: bool,
        /// Review edits applied before saving (FIELD=VALUE)
        #[arg(long = "field")]
        fields: Vec<String>,
    },
    /// Enter a receipt by hand
    Add {
        #[arg(long)]
        store: String,
        /// YYYY-MM-DD, today when omitted
        #[arg(long, default_value = "")]
        date: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "")]
        payment: String,
        #[arg(long, default_value = "")]
        subtotal: String,
        #[arg(long, default_value = "")]
        tax: String,
        #[arg(long, default_value = "")]
        discount: String,
        #[arg(long, default_value = "")]
        total: String,
        #[arg(long, default_value = "")]
        notes: String,
        /// Line item as NAME:PRICE:QTY (repeatable)
        #[arg(long = "item")]
        items: Vec<String>,
        /// Save even if a matching receipt already exists
        #[arg(long)]
        force: bool,
    },
    /// List receipts, newest first
    List {
        /// Case-insensitive merchant search
        #[arg(long, default_value = "")]
        search: String,
        /// All, Food, Bills, Gas, Shopping, Medical or Other
        #[arg(long, default_value = "All")]
        category: String,
    },
    /// Show one receipt with a signed photo URL
    Show { id: Uuid },
    /// Edit a receipt in place
    Edit {
        id: Uuid,
        /// FIELD=VALUE (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,
        /// INDEX.FIELD=VALUE (repeatable)
        #[arg(long = "set-item")]
        item_updates: Vec<String>,
        /// Append this many blank items before item updates
        #[arg(long, default_value = "0")]
        add_items: usize,
        /// Remove the item at INDEX after updates (repeatable)
        #[arg(long = "remove-item")]
        removals: Vec<usize>,
    },
    /// Delete a receipt
    Delete { id: Uuid },
    /// Validate a username and check that it is free
    CheckUsername { username: String },
    /// Create a profile with country presets
    Register {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
        #[arg(long, default_value = "Canada")]
        country: String,
    },
    /// Change country or tax system of a profile
    Profile {
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        tax_system: Option<String>,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Ask a yes/no question on stderr and read the answer from stdin.
async fn confirm_on_stdin(question: &str) -> anyhow::Result<bool> {
    eprint!("{} [y/N] ", question);
    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await
        .context("Failed to read answer")?;
    Ok(is_confirmation(&answer))
}

/// Print the user-facing view of an error, then fail with it.
fn report(err: AppError) -> anyhow::Error {
    let code = err.error_code();
    match err.log_level() {
        LogLevel::Debug => tracing::debug!(code, error = %err.detailed_message(), "Command rejected"),
        LogLevel::Warn => tracing::warn!(code, error = %err.detailed_message(), "Command failed"),
        LogLevel::Error => tracing::error!(code, error = %err.detailed_message(), "Command failed"),
    }
    let _ = print_json(&serde_json::json!({
        "error": err.client_message(),
        "code": code,
        "detail": (!err.is_sensitive()).then(|| err.to_string()),
        "retryable": err.is_recoverable(),
        "suggested_action": err.suggested_action(),
    }));
    err.into()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    let app = App::from_config(config).await?;
    let owner = || resolve_owner(cli.owner, std::env::var(OWNER_ENV).ok());

    match cli.command {
        Commands::Scan {
            image,
            force,
            fields,
        } => {
            let owner = owner()?;
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("Failed to read {}", image.display()))?;

            let mut pipeline = IngestionPipeline::capture(
                app.storage.clone(),
                app.ocr.clone(),
                app.duplicate_guard(),
                owner,
                bytes,
            )
            .map_err(report)?;
            pipeline.process().await.map_err(report)?;

            for assignment in &fields {
                let (field, value) = parse_field_assignment(assignment)?;
                pipeline.set_field(field, &value)?;
            }

            let mut outcome = pipeline.confirm(force).await.map_err(report)?;
            let question = match &outcome {
                SaveOutcome::Duplicate(notice) => Some(format!("{} Save anyway?", notice.message)),
                SaveOutcome::Saved(_) => None,
            };
            // Still in Review, so saving anyway reuses this upload and OCR result.
            if let Some(question) = question {
                if confirm_on_stdin(&question).await? {
                    outcome = pipeline.confirm(true).await.map_err(report)?;
                }
            }
            print_json(&serde_json::json!({
                "state": pipeline.state(),
                "result": outcome,
                "draft": pipeline.draft(),
            }))?;
        }
        Commands::Add {
            store,
            date,
            category,
            payment,
            subtotal,
            tax,
            discount,
            total,
            notes,
            items,
            force,
        } => {
            let form = ManualReceiptForm {
                store_name: store,
                date,
                category,
                payment_method: payment,
                subtotal,
                tax,
                discount,
                total_amount: total,
                notes,
                items: items.iter().map(|s| parse_item_row(s)).collect(),
            };
            let record = form.into_record(owner()?).map_err(report)?;
            let outcome = app
                .duplicate_guard()
                .save_new(record, force)
                .await
                .map_err(report)?;
            if let SaveOutcome::Duplicate(notice) = &outcome {
                tracing::info!(message = %notice.message, "Pass --force to save anyway");
            }
            print_json(&outcome)?;
        }
        Commands::List { search, category } => {
            let category: CategoryFilter = category.parse()?;
            let mut view = LedgerView::load(app.receipts.as_ref(), owner()?)
                .await
                .map_err(report)?;
            view.set_search(search);
            view.set_category(category);
            print_json(&serde_json::json!({
                "count": view.visible_count(),
                "total": view.visible_total(),
                "receipts": view.visible(),
            }))?;
        }
        Commands::Show { id } => {
            let session = EditableSession::open(app.receipts.clone(), owner()?, id)
                .await
                .map_err(report)?;
            let record = session.baseline();
            let image = app
                .image_access()
                .resolve(record.image_ref.as_deref())
                .await
                .map_err(report)?;
            print_json(&serde_json::json!({
                "receipt": record,
                "items_total": record.items_total(),
                "image": image,
            }))?;
        }
        Commands::Edit {
            id,
            fields,
            item_updates,
            add_items,
            removals,
        } => {
            let mut session = EditableSession::open(app.receipts.clone(), owner()?, id)
                .await
                .map_err(report)?;
            session.begin_edit();

            for assignment in &fields {
                let (field, value) = parse_field_assignment(assignment)?;
                session.set_field(field, &value)?;
            }
            for _ in 0..add_items {
                session.add_item()?;
            }
            for assignment in &item_updates {
                let (index, field, value) = parse_item_assignment(assignment)?;
                session.update_item(index, field, &value)?;
            }
            let mut removals = removals;
            // Highest index first so earlier removals do not shift later ones.
            removals.sort_unstable_by(|a, b| b.cmp(a));
            for index in removals {
                session.remove_item(index)?;
            }

            if !session.is_dirty() {
                session.cancel();
                print_json(session.baseline())?;
                return Ok(());
            }
            let committed = session.commit().await.map_err(report)?;
            print_json(committed)?;
        }
        Commands::Delete { id } => {
            let session = EditableSession::open(app.receipts.clone(), owner()?, id)
                .await
                .map_err(report)?;
            session.delete().await.map_err(report)?;
            print_json(&serde_json::json!({
                "success": true,
                "message": format!("Receipt {} deleted", id),
            }))?;
        }
        Commands::CheckUsername { username } => {
            let mut checker = app.username_checker();
            checker.input(&username);
            let status = match checker.status() {
                UsernameStatus::Checking => checker.settled().await,
                local => local,
            };
            print_json(&serde_json::json!({ "username": username, "result": status }))?;
        }
        Commands::Register {
            first_name,
            last_name,
            email,
            username,
            password,
            confirm_password,
            country,
        } => {
            let country: Country = country.parse()?;
            let form = RegistrationForm {
                first_name,
                last_name,
                email,
                username,
                password,
                confirm_password,
                country: Some(country),
            };
            form.check().map_err(report)?;

            let mut checker = app.username_checker();
            checker.input(&form.username);
            match checker.settled().await {
                UsernameStatus::Available => {}
                other => {
                    print_json(&serde_json::json!({ "username": form.username, "result": other }))?;
                    anyhow::bail!("Username {} cannot be used", form.username);
                }
            }

            let profile = UserProfile::with_country_defaults(
                owner().unwrap_or_else(|_| Uuid::new_v4()),
                &form.username,
                &form.first_name,
                &form.last_name,
                &form.email,
                country,
            );
            app.profiles()?.create(&profile).await.map_err(report)?;
            print_json(&profile)?;
        }
        Commands::Profile {
            country,
            tax_system,
        } => {
            let owner = owner()?;
            let profiles = app.profiles()?;
            let mut profile = profiles
                .get(owner)
                .await
                .map_err(report)?
                .ok_or_else(|| anyhow::anyhow!("No profile for {}", owner))?;

            if let Some(country) = country {
                profile.set_country(country.parse()?);
            }
            if let Some(tax_system) = tax_system {
                profile.set_tax_system(&tax_system).map_err(report)?;
            }
            profiles.update_settings(&profile).await.map_err(report)?;
            print_json(&serde_json::json!({
                "profile": profile,
                "tax_options": profile.country.tax_options(),
            }))?;
        }
    }

    Ok(())
}
