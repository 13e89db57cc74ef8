use crate::telemetry::{generate_reading, SeriesSummary};
use crate::{Cli, Command, KeyArgs, SavedCommand, WorkflowCommand};
use anyhow::{anyhow, bail, Context, Result};
use gateway_client::guide::{self, GuideContext};
use gateway_client::metrics::{gather_metrics, init_metrics};
use gateway_client::{
    Action, ApiClient, Channel, ClientConfig, ExportQuery, Fields, FileStore, KeyScope,
    NewWorkflow, Reading, ReadingsQuery, Rule, SavedChannel, SavedChannels, SeriesQuery,
};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

pub async fn run(cli: Cli) -> Result<()> {
    init_metrics()?;

    let config = ClientConfig {
        base_url: cli.api_url.clone(),
        ..ClientConfig::from_env()
    };
    let client = ApiClient::new(&config)?;
    let saved = SavedChannels::new(FileStore::new(&cli.store));

    let session = Session {
        client: &client,
        saved: &saved,
        base_url: &config.base_url,
    };
    let outcome = session.dispatch(cli.command).await;

    // Printed whether or not the command succeeded.
    if cli.print_metrics {
        eprint!("{}", metrics_report(&outcome)?);
    }
    outcome
}

fn metrics_report(outcome: &Result<()>) -> Result<String> {
    let mut report = gather_metrics()?;
    if let Err(e) = outcome {
        report.push_str(&format!("# command failed: {e:#}\n"));
    }
    Ok(report)
}

struct Session<'a> {
    client: &'a ApiClient,
    saved: &'a SavedChannels<FileStore>,
    base_url: &'a str,
}

impl Session<'_> {
    async fn dispatch(&self, command: Command) -> Result<()> {
        match command {
            Command::Create {
                name,
                description,
                fields,
            } => self.create(&name, description.as_deref(), &fields).await,
            Command::Channel { id } => print_json(&self.client.get_channel(&id).await?),
            Command::Key { channel_id, scope } => {
                print_json(&self.client.create_api_key(&channel_id, scope).await?)
            }
            Command::Post { auth, fields } => {
                let key = self.api_key(&auth)?;
                let fields = parse_fields(&fields)?;
                print_json(&self.client.post_reading(&key, &fields).await?)
            }
            Command::Latest { auth } => {
                let key = self.api_key(&auth)?;
                print_json(&self.client.get_latest_reading(&key).await?)
            }
            Command::Readings {
                auth,
                limit,
                since,
            } => {
                let key = self.api_key(&auth)?;
                let readings = self
                    .client
                    .get_readings(&key, ReadingsQuery { limit, since })
                    .await?;
                print_json(&readings)
            }
            Command::Series {
                auth,
                field,
                limit,
                since,
            } => {
                let key = self.api_key(&auth)?;
                let query = SeriesQuery {
                    field,
                    limit,
                    since,
                };
                print_json(&self.client.get_series(&key, &query).await?)
            }
            Command::Workflow(command) => self.workflow(command).await,
            Command::Export { auth, limit, out } => {
                let key = self.api_key(&auth)?;
                let csv = self.client.export_csv(&key, ExportQuery { limit }).await?;
                match out {
                    Some(path) => {
                        std::fs::write(&path, csv)
                            .with_context(|| format!("writing {}", path.display()))?;
                        info!("CSV written to {}", path.display());
                    }
                    None => print!("{csv}"),
                }
                Ok(())
            }
            Command::Saved(command) => self.saved_command(command),
            Command::Watch {
                channel_id,
                key,
                field,
                interval_secs,
                count,
            } => {
                let key = self.key_for_channel(&channel_id, key)?;
                self.watch(&channel_id, &key, field, interval_secs, count)
                    .await
            }
            Command::Guide {
                channel_id,
                key,
                platform,
            } => {
                let key = self.key_for_channel(&channel_id, key)?;
                let channel = match self.client.get_channel(&channel_id).await {
                    Ok(channel) => Some(channel),
                    Err(e) => {
                        warn!("Could not load channel {}: {}", channel_id, e);
                        None
                    }
                };
                let guide_ctx =
                    GuideContext::new(self.base_url, &key, channel.as_ref(), &mut rand::thread_rng());
                print!("{}", guide::render(platform, &guide_ctx));
                Ok(())
            }
            Command::Simulate {
                auth,
                fields,
                interval_secs,
                count,
            } => {
                let key = self.api_key(&auth)?;
                self.simulate(&key, &split_fields(&fields), interval_secs, count)
                    .await
            }
        }
    }

    async fn create(&self, name: &str, description: Option<&str>, fields: &str) -> Result<()> {
        let channel = self
            .client
            .create_channel(name, description, &split_fields(fields))
            .await?;
        let key = self
            .client
            .create_api_key(&channel.id, KeyScope::ReadWrite)
            .await?;

        self.saved.add(SavedChannel {
            id: channel.id.clone(),
            name: channel.name.clone(),
            api_key: key.key.clone(),
        })?;
        info!("Saved channel {} to the local store", channel.id);

        print_json(&json!({ "channel": channel, "apiKey": key.key }))
    }

    async fn workflow(&self, command: WorkflowCommand) -> Result<()> {
        match command {
            WorkflowCommand::Create {
                auth,
                name,
                field,
                op,
                value,
                url,
                disabled,
            } => {
                let key = self.api_key(&auth)?;
                let mut workflow =
                    NewWorkflow::new(name, Rule { field, op, value }, Action::webhook(url));
                workflow.enabled = !disabled;
                print_json(&self.client.create_workflow(&key, &workflow).await?)
            }
            WorkflowCommand::List { auth } => {
                let key = self.api_key(&auth)?;
                print_json(&self.client.get_workflows(&key).await?)
            }
        }
    }

    fn saved_command(&self, command: SavedCommand) -> Result<()> {
        match command {
            SavedCommand::List => print_json(&self.saved.list()?),
            SavedCommand::Remove { id } => {
                let removed = self.saved.remove(&id)?;
                if removed == 0 {
                    bail!("no saved channel with id {id}");
                }
                info!("Removed {} saved entries for {}", removed, id);
                Ok(())
            }
            SavedCommand::Clear => Ok(self.saved.clear()?),
        }
    }

    async fn watch(
        &self,
        channel_id: &str,
        key: &str,
        field: Option<String>,
        interval_secs: u64,
        count: Option<u64>,
    ) -> Result<()> {
        let channel = self.client.get_channel(channel_id).await?;
        println!("{} ({})", channel.name, channel.id);
        if let Some(description) = &channel.description {
            println!("{description}");
        }
        println!("Fields: {}", channel.allowed_fields.join(", "));

        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        let mut refreshes = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    return Ok(());
                }
            }

            let latest = self.client.get_latest_reading(key).await;
            if let Err(e) = &latest {
                warn!("Failed to refresh latest reading: {}", e);
            }
            println!("{}", latest_line(&latest));

            let chart_field = field.clone().or_else(|| default_chart_field(&channel));

            if let Some(chart_field) = chart_field {
                match self
                    .client
                    .get_series(key, &SeriesQuery::new(chart_field.as_str()))
                    .await
                {
                    Ok(points) => match SeriesSummary::of(&points) {
                        Some(s) => println!(
                            "  {}: n={} min={} max={} mean={:.2} last={}",
                            chart_field, s.count, s.min, s.max, s.mean, s.last
                        ),
                        None => println!("  {chart_field}: no data"),
                    },
                    Err(e) => warn!("Failed to refresh series for {}: {}", chart_field, e),
                }
            }

            refreshes += 1;
            if count.is_some_and(|c| refreshes >= c) {
                return Ok(());
            }
        }
    }

    async fn simulate(
        &self,
        key: &str,
        fields: &[String],
        interval_secs: u64,
        count: Option<u64>,
    ) -> Result<()> {
        if fields.is_empty() {
            bail!("at least one field is required");
        }

        info!(
            "Posting readings for [{}] every {}s",
            fields.join(", "),
            interval_secs
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        let mut sent = 0u64;
        let mut failed = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }

            let reading = generate_reading(&mut rand::thread_rng(), fields);
            match self.client.post_reading(key, &reading).await {
                Ok(_) => {
                    sent += 1;
                    println!("{}", serde_json::to_string(&reading)?);
                }
                Err(e) => {
                    failed += 1;
                    warn!("Failed to post reading: {}", e);
                }
            }

            if count.is_some_and(|c| sent + failed >= c) {
                break;
            }
        }

        info!("Posted {} readings ({} failed)", sent, failed);
        Ok(())
    }

    fn api_key(&self, auth: &KeyArgs) -> Result<String> {
        if let Some(key) = &auth.key {
            return Ok(key.clone());
        }
        match &auth.channel {
            Some(channel_id) => self.saved_key(channel_id),
            None => bail!("no API key: pass --key or --channel <saved channel id>"),
        }
    }

    fn key_for_channel(&self, channel_id: &str, key: Option<String>) -> Result<String> {
        match key {
            Some(key) => Ok(key),
            None => self.saved_key(channel_id),
        }
    }

    fn saved_key(&self, channel_id: &str) -> Result<String> {
        self.saved
            .find(channel_id)?
            .map(|c| c.api_key)
            .ok_or_else(|| anyhow!("no saved API key for channel {channel_id}"))
    }
}

/// One status line for the latest reading; a failed request is reported as
/// such rather than as an empty channel.
fn latest_line(latest: &gateway_client::Result<Option<Reading>>) -> String {
    match latest {
        Ok(Some(reading)) => {
            let values: Vec<String> = reading
                .fields
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            format!("[{}] {}", reading.ts.to_rfc3339(), values.join(" "))
        }
        Ok(None) => "No readings yet".to_string(),
        Err(e) => format!("Latest reading unavailable: {e}"),
    }
}

/// `temperature` when the channel has it, else the channel's first field.
fn default_chart_field(channel: &Channel) -> Option<String> {
    if channel.allowed_fields.iter().any(|f| f == "temperature") {
        return Some("temperature".to_string());
    }
    channel.allowed_fields.first().cloned()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Splits a comma-separated field list, dropping blanks.
pub fn split_fields(fields: &str) -> Vec<String> {
    fields
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `name=value` pairs into a reading.
pub fn parse_fields(pairs: &[String]) -> Result<Fields> {
    pairs
        .iter()
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("expected field=value, got '{pair}'"))?;
            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("invalid number for field '{}'", name.trim()))?;
            Ok((name.trim().to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gateway_client::Error;

    fn channel(fields: &[&str]) -> Channel {
        Channel {
            id: "ch_1".to_string(),
            name: "Greenhouse".to_string(),
            description: None,
            allowed_fields: fields.iter().map(|f| f.to_string()).collect(),
            max_fields: 10,
            min_write_interval_seconds: 15,
            min_read_interval_seconds: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(
            split_fields(" temperature, humidity,,pressure "),
            vec!["temperature", "humidity", "pressure"]
        );
        assert!(split_fields(" , ").is_empty());
    }

    #[test]
    fn test_parse_fields() {
        let fields = parse_fields(&["temperature=24.5".to_string(), "humidity = 60".to_string()])
            .unwrap();
        assert_eq!(fields["temperature"], 24.5);
        assert_eq!(fields["humidity"], 60.0);

        assert!(parse_fields(&["temperature".to_string()]).is_err());
        assert!(parse_fields(&["temperature=hot".to_string()]).is_err());
    }

    #[test]
    fn test_latest_line_separates_empty_from_failed() {
        assert_eq!(latest_line(&Ok(None)), "No readings yet");

        let reading = Reading {
            ts: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            fields: [("humidity".to_string(), 60.2), ("temperature".to_string(), 24.5)]
                .into_iter()
                .collect(),
        };
        assert_eq!(
            latest_line(&Ok(Some(reading))),
            "[2024-05-01T12:00:00+00:00] humidity=60.2 temperature=24.5"
        );

        let failed = Err(Error::Http {
            status: 401,
            message: Some("invalid api key".to_string()),
        });
        let line = latest_line(&failed);
        assert_eq!(line, "Latest reading unavailable: HTTP 401: invalid api key");
        assert_ne!(line, "No readings yet");
    }

    #[test]
    fn test_default_chart_field() {
        assert_eq!(
            default_chart_field(&channel(&["humidity", "temperature"])).as_deref(),
            Some("temperature")
        );
        assert_eq!(
            default_chart_field(&channel(&["pressure", "co2"])).as_deref(),
            Some("pressure")
        );
        assert_eq!(default_chart_field(&channel(&[])), None);
    }

    #[test]
    fn test_metrics_report_on_failed_command() {
        init_metrics().unwrap();

        let failed: Result<()> = Err(anyhow!("HTTP 429: Too many requests"));
        let report = metrics_report(&failed).unwrap();
        assert!(report.contains("gateway_client_requests_total"));
        assert!(report.contains("# command failed: HTTP 429: Too many requests"));

        let report = metrics_report(&Ok(())).unwrap();
        assert!(!report.contains("command failed"));
    }
}
