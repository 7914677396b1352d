use std::process;
use std::sync::Arc;

use bytes::Bytes;
use time::{Duration, OffsetDateTime};
use tracing::error;
use uuid::Uuid;

use plateful::application::content::{
    ContentDraft, ContentOrchestrator, ContentSettings,
};
use plateful::application::library::{ImageStore, MediaHost, NewImage};
use plateful::application::publish::{PlatformClient, PublishPipeline, TokenKeeper};
use plateful::application::resolver::DishResolver;
use plateful::cache::TtlCache;
use plateful::config::{
    self, CliArgs, Command, LibraryBackend, LibraryCommand, Settings, TokenCommand,
};
use plateful::domain::aliases::AliasTable;
use plateful::domain::images::DishName;
use plateful::domain::types::{AccessToken, TriggerKind};
use plateful::infra::image_ops::RecodeBudget;
use plateful::infra::library::FileLibrary;
use plateful::infra::media_host::{HostedLibrary, TaggedMediaClient};
use plateful::infra::platform::GraphPlatformClient;
use plateful::infra::providers::{
    CalendarificHolidays, ChatCaptionWriter, OpenWeatherProvider, SquareSalesProvider,
};
use plateful::infra::rehost::RehostService;
use plateful::infra::telemetry;

type CommandError = Box<dyn std::error::Error>;

#[tokio::main]
async fn main() {
    let (args, settings) = match config::load_with_cli() {
        Ok(resolved) => resolved,
        Err(err) => {
            eprintln!("configuration error: {err}");
            process::exit(2);
        }
    };

    if let Err(err) = telemetry::init(&settings.logging) {
        eprintln!("telemetry error: {err}");
        process::exit(2);
    }

    if let Err(err) = run(args, settings).await {
        error!(target = "main", error = %err, "command failed");
        eprintln!("error: {err}");
        process::exit(1);
    }
}

struct Services {
    orchestrator: ContentOrchestrator,
    store: Arc<dyn ImageStore>,
    platform: Arc<dyn PlatformClient>,
    tokens: Arc<TokenKeeper>,
    near_expiry_days: u8,
}

impl Services {
    fn build(settings: &Settings) -> Result<Self, CommandError> {
        let aliases = match settings.aliases.file.as_ref() {
            Some(path) => AliasTable::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => AliasTable::builtin().clone(),
        };

        let media_client: Arc<dyn MediaHost> = Arc::new(TaggedMediaClient::new(
            settings.media_host.base.clone(),
            settings.media_host.api_key.clone().unwrap_or_default(),
        )?);

        let store: Arc<dyn ImageStore> = match settings.library.backend {
            LibraryBackend::File => Arc::new(FileLibrary::new(
                settings.library.directory.clone(),
                settings.library.map_path.clone(),
                settings.library.public_base_url.clone(),
            )?),
            LibraryBackend::Hosted => {
                let seed_tags = settings
                    .library
                    .seed_tags
                    .iter()
                    .filter_map(|tag| DishName::new(tag.as_str()).ok())
                    .collect();
                Arc::new(HostedLibrary::new(Arc::clone(&media_client), seed_tags))
            }
        };

        let resolver = Arc::new(DishResolver::new(Arc::clone(&store), aliases));

        let platform: Arc<dyn PlatformClient> = Arc::new(GraphPlatformClient::new(
            settings.platform.graph_base.clone(),
            settings.platform.refresh_base.clone(),
        )?);
        let tokens = Arc::new(TokenKeeper::new(
            settings
                .platform
                .access_token
                .clone()
                .map(|value| AccessToken {
                    value,
                    expires_at: None,
                }),
        ));
        let rehoster = Arc::new(RehostService::new(
            Arc::clone(&media_client),
            RecodeBudget {
                max_width: settings.media.max_width.get(),
                jpeg_quality: settings.media.jpeg_quality,
            },
            DishName::new(settings.media_host.staging_tag.as_str())?,
        )?);
        let pipeline = Arc::new(PublishPipeline::new(
            Arc::clone(&platform),
            Arc::clone(&tokens),
            rehoster,
            settings.platform.account_id.clone(),
        ));

        let sales = Arc::new(SquareSalesProvider::new(
            settings.providers.sales.base.clone(),
            settings.providers.sales.access_token.clone().unwrap_or_default(),
            settings.providers.sales.location_id.clone().unwrap_or_default(),
        )?);
        let weather = Arc::new(OpenWeatherProvider::new(
            settings.providers.weather.base.clone(),
            settings.providers.weather.api_key.clone().unwrap_or_default(),
        )?);
        let holidays = Arc::new(CalendarificHolidays::new(
            settings.providers.holiday.base.clone(),
            settings.providers.holiday.api_key.clone().unwrap_or_default(),
        )?);
        let captions = Arc::new(ChatCaptionWriter::new(
            settings.providers.caption.base.clone(),
            settings.providers.caption.api_key.clone().unwrap_or_default(),
            settings.providers.caption.model.clone(),
        )?);

        let orchestrator = ContentOrchestrator::new(
            Arc::new(TtlCache::new()),
            sales,
            weather,
            holidays,
            captions,
            Arc::clone(&store),
            resolver,
            pipeline,
            ContentSettings {
                trigger_ttl: settings.cache.trigger_ttl,
                caption_ttl: settings.cache.caption_ttl,
                hashtags: settings.captions.hashtags.clone(),
                city: settings.providers.weather.city.clone(),
                country: settings.providers.holiday.country.clone(),
            },
        );

        Ok(Self {
            orchestrator,
            store,
            platform,
            tokens,
            near_expiry_days: settings.platform.near_expiry_days,
        })
    }
}

async fn run(args: CliArgs, settings: Settings) -> Result<(), CommandError> {
    let services = Services::build(&settings)?;

    match args.command {
        Command::Preview(preview) => {
            let trigger: TriggerKind = preview.trigger.parse()?;
            let salt = preview.regenerate.then(|| Uuid::new_v4().to_string());
            let draft = services
                .orchestrator
                .compose(trigger, salt.as_deref())
                .await?;
            print_draft(&draft);
        }
        Command::Publish(publish) => {
            let trigger: TriggerKind = publish.trigger.parse()?;
            let mut draft = services.orchestrator.compose(trigger, None).await?;
            if let Some(caption) = publish.caption {
                draft.caption = caption;
            }
            print_draft(&draft);
            let receipt = services.orchestrator.publish(&draft).await?;
            println!(
                "published (creation {}, post {})",
                receipt.creation_id.0,
                receipt.post_id.as_deref().unwrap_or("-"),
            );
        }
        Command::Token(token) => match token.command {
            TokenCommand::Status => {
                let health = services
                    .tokens
                    .check_status(services.platform.as_ref())
                    .await?;
                let phase = health.phase(
                    OffsetDateTime::now_utc(),
                    Duration::days(i64::from(services.near_expiry_days)),
                );
                println!("token:   {phase}");
                match health.expires_at {
                    Some(at) => println!("expires: {at}"),
                    None => println!("expires: unknown"),
                }
                if !health.scopes.is_empty() {
                    println!("scopes:  {}", health.scopes.join(", "));
                }
            }
            TokenCommand::Refresh => {
                let renewed = services
                    .tokens
                    .refresh(services.platform.as_ref())
                    .await?;
                match renewed.expires_at {
                    Some(at) => println!("token refreshed; expires {at}"),
                    None => println!("token refreshed; lifetime unknown"),
                }
            }
        },
        Command::Library(library) => {
            handle_library(&services, library.command).await?;
        }
    }

    Ok(())
}

async fn handle_library(services: &Services, command: LibraryCommand) -> Result<(), CommandError> {
    match command {
        LibraryCommand::List => {
            let snapshot = services.store.list_all().await?;
            if snapshot.is_empty() {
                println!("library is empty");
                return Ok(());
            }
            for (dish, records) in &snapshot {
                println!("{dish} ({})", records.len());
                for record in records {
                    println!("  {}", record.locator);
                }
            }
        }
        LibraryCommand::Add { file, dish } => {
            let dish = DishName::new(dish)?;
            let payload = tokio::fs::read(&file).await?;
            let original_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            let record = services
                .store
                .add(
                    NewImage {
                        original_name,
                        payload: Bytes::from(payload),
                    },
                    &dish,
                )
                .await?;
            println!("added {} under {}", record.locator, record.dish);
        }
        LibraryCommand::Remove { locator } => {
            services.store.remove(&locator).await?;
            println!("removed {locator}");
        }
        LibraryCommand::Move { locator, from, to } => {
            let from = DishName::new(from)?;
            let to = DishName::new(to)?;
            services.store.recategorize(&locator, &from, &to).await?;
            println!("moved {locator} from {from} to {to}");
        }
    }
    Ok(())
}

fn print_draft(draft: &ContentDraft) {
    println!("trigger: {}", draft.trigger);
    println!("context: {}", draft.context);
    match &draft.image {
        Some(image) => println!("image:   {} ({})", image.locator, image.dish),
        None => println!("image:   (none available)"),
    }
    println!("---");
    println!("{}", draft.caption);
}
