use crate::models::{Asset, BalancePoint, Device, RiskSettings};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{error, info};
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS settings (
    id SERIAL PRIMARY KEY,
    bitcoin_tp_percentage DOUBLE PRECISION NOT NULL DEFAULT 2.5,
    bitcoin_sl_percentage DOUBLE PRECISION NOT NULL DEFAULT 1.5,
    xauusd_tp_percentage DOUBLE PRECISION NOT NULL DEFAULT 1.8,
    xauusd_sl_percentage DOUBLE PRECISION NOT NULL DEFAULT 0.8,
    update_interval_minutes INTEGER NOT NULL DEFAULT 15,
    last_btc_signal TEXT NOT NULL DEFAULT 'N/A',
    last_gold_signal TEXT NOT NULL DEFAULT 'N/A'
);

CREATE TABLE IF NOT EXISTS trained_models (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    data BYTEA NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS devices (
    id SERIAL PRIMARY KEY,
    fcm_token TEXT NOT NULL UNIQUE,
    registered_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS backtest_results (
    id TEXT PRIMARY KEY,
    asset TEXT NOT NULL,
    date DATE NOT NULL,
    balance DOUBLE PRECISION NOT NULL
);

CREATE INDEX IF NOT EXISTS backtest_results_asset_date_idx
    ON backtest_results (asset, date);
";

pub struct Database {
    client: Client,
}

impl Database {
    pub async fn new<S: AsRef<str>>(database_url: S) -> Result<Self> {
        let database_url = database_url.as_ref().to_string();
        let (client, connection) = tokio_postgres::connect(&database_url, NoTls)
            .await
            .with_context(|| format!("failed to connect to PostgreSQL at {}", database_url))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("PostgreSQL connection error: {}", err);
            }
        });

        Ok(Self { client })
    }

    /// Creates all tables on demand so a fresh database works without a
    /// separate migration step.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.client
            .batch_execute(SCHEMA)
            .await
            .context("failed to create database schema")
    }

    /// Reads the singleton settings row, creating it with defaults when
    /// the table is still empty.
    pub async fn load_settings(&self) -> Result<RiskSettings> {
        let row = self
            .client
            .query_opt(
                "SELECT bitcoin_tp_percentage, bitcoin_sl_percentage,
                        xauusd_tp_percentage, xauusd_sl_percentage,
                        update_interval_minutes, last_btc_signal, last_gold_signal
                 FROM settings
                 ORDER BY id
                 LIMIT 1",
                &[],
            )
            .await?;

        if let Some(row) = row {
            return Ok(RiskSettings {
                bitcoin_tp_percentage: row.get(0),
                bitcoin_sl_percentage: row.get(1),
                xauusd_tp_percentage: row.get(2),
                xauusd_sl_percentage: row.get(3),
                update_interval_minutes: row.get(4),
                last_btc_signal: row.get(5),
                last_gold_signal: row.get(6),
            });
        }

        info!("No settings row found, creating the default entry.");
        let defaults = RiskSettings::default();
        self.insert_settings(&defaults).await?;
        Ok(defaults)
    }

    pub async fn save_settings(&self, settings: &RiskSettings) -> Result<()> {
        let existing = self
            .client
            .query_opt("SELECT id FROM settings ORDER BY id LIMIT 1", &[])
            .await?;

        match existing {
            Some(row) => {
                let id: i32 = row.get(0);
                self.client
                    .execute(
                        "UPDATE settings
                         SET bitcoin_tp_percentage = $1,
                             bitcoin_sl_percentage = $2,
                             xauusd_tp_percentage = $3,
                             xauusd_sl_percentage = $4,
                             update_interval_minutes = $5,
                             last_btc_signal = $6,
                             last_gold_signal = $7
                         WHERE id = $8",
                        &[
                            &settings.bitcoin_tp_percentage,
                            &settings.bitcoin_sl_percentage,
                            &settings.xauusd_tp_percentage,
                            &settings.xauusd_sl_percentage,
                            &settings.update_interval_minutes,
                            &settings.last_btc_signal,
                            &settings.last_gold_signal,
                            &id,
                        ],
                    )
                    .await?;
            }
            None => self.insert_settings(settings).await?,
        }

        Ok(())
    }

    async fn insert_settings(&self, settings: &RiskSettings) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO settings (bitcoin_tp_percentage, bitcoin_sl_percentage,
                                       xauusd_tp_percentage, xauusd_sl_percentage,
                                       update_interval_minutes, last_btc_signal, last_gold_signal)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &settings.bitcoin_tp_percentage,
                    &settings.bitcoin_sl_percentage,
                    &settings.xauusd_tp_percentage,
                    &settings.xauusd_sl_percentage,
                    &settings.update_interval_minutes,
                    &settings.last_btc_signal,
                    &settings.last_gold_signal,
                ],
            )
            .await?;
        Ok(())
    }

    /// Records the most recent signal label for one asset without
    /// touching the rest of the settings row.
    pub async fn update_last_signal(&self, asset: Asset, value: &str) -> Result<()> {
        let statement = match asset {
            Asset::Bitcoin => "UPDATE settings SET last_btc_signal = $1",
            Asset::Gold => "UPDATE settings SET last_gold_signal = $1",
        };
        let updated = self.client.execute(statement, &[&value]).await?;
        if updated == 0 {
            // Settings row does not exist yet; create it and retry once.
            self.insert_settings(&RiskSettings::default()).await?;
            self.client.execute(statement, &[&value]).await?;
        }
        Ok(())
    }

    pub async fn upsert_artifact(&self, name: &str, data: &[u8]) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO trained_models (name, data, updated_at)
                 VALUES ($1, $2, now())
                 ON CONFLICT (name) DO UPDATE
                 SET data = EXCLUDED.data, updated_at = now()",
                &[&name, &data],
            )
            .await
            .with_context(|| format!("failed to store artifact {}", name))?;
        Ok(())
    }

    pub async fn get_artifact(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let row = self
            .client
            .query_opt("SELECT data FROM trained_models WHERE name = $1", &[&name])
            .await?;
        Ok(row.map(|row| row.get::<_, Vec<u8>>(0)))
    }

    /// Registers a device token; returns false when it was already known.
    pub async fn register_device(&self, fcm_token: &str) -> Result<bool> {
        let inserted = self
            .client
            .execute(
                "INSERT INTO devices (fcm_token)
                 VALUES ($1)
                 ON CONFLICT (fcm_token) DO NOTHING",
                &[&fcm_token],
            )
            .await?;
        Ok(inserted == 1)
    }

    pub async fn get_devices(&self) -> Result<Vec<Device>> {
        let rows = self
            .client
            .query(
                "SELECT id, fcm_token, registered_at FROM devices ORDER BY id",
                &[],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| Device {
                id: row.get(0),
                fcm_token: row.get(1),
                registered_at: row.get(2),
            })
            .collect())
    }

    pub async fn delete_device(&self, fcm_token: &str) -> Result<()> {
        self.client
            .execute("DELETE FROM devices WHERE fcm_token = $1", &[&fcm_token])
            .await?;
        Ok(())
    }

    /// Replaces the stored balance history for one asset with the winning
    /// run of the latest grid search.
    pub async fn replace_backtest_history(
        &mut self,
        asset: Asset,
        points: &[BalancePoint],
    ) -> Result<()> {
        let ticker = asset.history_ticker();
        let tx = self.client.transaction().await?;

        tx.execute("DELETE FROM backtest_results WHERE asset = $1", &[&ticker])
            .await?;
        for point in points {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO backtest_results (id, asset, date, balance)
                 VALUES ($1, $2, $3, $4)",
                &[&id, &ticker, &point.date, &point.balance],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_backtest_history(&self, asset: Asset) -> Result<Vec<BalancePoint>> {
        let rows = self
            .client
            .query(
                "SELECT date, balance FROM backtest_results WHERE asset = $1 ORDER BY date",
                &[&asset.history_ticker()],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| BalancePoint {
                date: row.get::<_, NaiveDate>(0),
                balance: row.get(1),
            })
            .collect())
    }
}
