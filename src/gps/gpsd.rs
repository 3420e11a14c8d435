//! # gpsd Client
//!
//! Minimal client for the gpsd JSON protocol over TCP.
//!
//! ## Session
//!
//! 1. Connect; gpsd greets with a `VERSION` object.
//! 2. Send `?WATCH={"enable":true}`; gpsd answers with `DEVICES` and `WATCH`.
//!    Without `"json":true` no reports are streamed, so the socket stays
//!    quiet between polls.
//! 3. For every poll send `?POLL;` and read back one `POLL` object carrying
//!    the latest `TPV` (time/position/velocity) and `SKY` (satellites).
//!
//! Every line read is bounded by the configured timeout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Fix, FixMode, PositionSource};
use crate::error::{PicycleError, Result};

/// Default gpsd port
pub const GPSD_DEFAULT_PORT: u16 = 2947;

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true}\n";
const POLL_COMMAND: &[u8] = b"?POLL;\n";

/// Lines to skip while waiting for an expected reply class
const MAX_SKIPPED_LINES: usize = 8;

/// Any gpsd object; only the class is needed to route it.
#[derive(Debug, Deserialize)]
struct Envelope {
    class: String,
}

/// Reply to `?POLL;`
#[derive(Debug, Deserialize)]
struct PollReport {
    #[serde(default)]
    tpv: Vec<TpvReport>,
    #[serde(default)]
    sky: Vec<SkyReport>,
}

#[derive(Debug, Default, Deserialize)]
struct TpvReport {
    #[serde(default)]
    mode: u8,
    time: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    alt: Option<f64>,
    #[serde(rename = "altMSL")]
    alt_msl: Option<f64>,
    #[serde(rename = "altHAE")]
    alt_hae: Option<f64>,
    speed: Option<f64>,
    track: Option<f64>,
    climb: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct SkyReport {
    #[serde(default)]
    satellites: Vec<Satellite>,
    #[serde(rename = "nSat")]
    n_sat: Option<usize>,
    #[serde(rename = "uSat")]
    u_sat: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct Satellite {
    #[serde(default)]
    used: bool,
}

/// Build a [`Fix`] from a raw `POLL` line.
fn parse_poll(line: &str) -> Result<Fix> {
    let report: PollReport = serde_json::from_str(line)?;

    let tpv = report.tpv.into_iter().next().unwrap_or_default();
    let sky = report.sky.into_iter().next().unwrap_or_default();

    let satellites = sky.n_sat.unwrap_or(sky.satellites.len());
    let satellites_used = sky
        .u_sat
        .unwrap_or_else(|| sky.satellites.iter().filter(|s| s.used).count());

    let time = match tpv.time {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| PicycleError::GpsProtocol(format!("Bad TPV time '{}': {}", raw, e)))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(Fix {
        mode: FixMode::from_gpsd(tpv.mode),
        satellites,
        satellites_used,
        latitude: tpv.lat,
        longitude: tpv.lon,
        altitude: tpv.alt.or(tpv.alt_msl).or(tpv.alt_hae),
        speed: tpv.speed,
        track: tpv.track,
        climb: tpv.climb,
        time,
    })
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn send(&mut self, command: &[u8]) -> Result<()> {
        self.writer
            .write_all(command)
            .await
            .map_err(|e| PicycleError::GpsConnection(format!("Failed to send command: {}", e)))
    }

    /// Read lines until one of class `class` arrives.
    async fn read_reply(&mut self, class: &str, timeout: Duration) -> Result<String> {
        for _ in 0..MAX_SKIPPED_LINES {
            let mut line = String::new();
            let read = tokio::time::timeout(timeout, self.reader.read_line(&mut line))
                .await
                .map_err(|_| PicycleError::GpsConnection(format!("Timed out waiting for {}", class)))?
                .map_err(|e| PicycleError::GpsConnection(format!("Read failed: {}", e)))?;

            if read == 0 {
                return Err(PicycleError::GpsConnection("gpsd closed the connection".to_string()));
            }

            let envelope: Envelope = serde_json::from_str(line.trim())?;
            if envelope.class == class {
                return Ok(line);
            }

            debug!("Skipping gpsd {} object while waiting for {}", envelope.class, class);
        }

        Err(PicycleError::GpsProtocol(format!("No {} reply from gpsd", class)))
    }
}

/// Connection to a running gpsd
///
/// Cheap to share behind an `Arc`; concurrent polls are serialized.
pub struct GpsdClient {
    connection: Mutex<Connection>,
    address: String,
    timeout: Duration,
}

impl std::fmt::Debug for GpsdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpsdClient")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GpsdClient {
    /// Connect and enable watching
    ///
    /// # Errors
    ///
    /// `GpsConnection` if the daemon is unreachable or does not complete the
    /// handshake within `timeout`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use picycle::gps::gpsd::GpsdClient;
    /// use picycle::gps::PositionSource;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let gps = GpsdClient::connect("127.0.0.1", 2947, Duration::from_secs(1)).await?;
    ///     let fix = gps.current_fix().await?;
    ///     println!("{} satellites, {:?}", fix.satellites, fix.mode);
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let address = format!("{}:{}", host, port);
        debug!("Connecting to gpsd at {}", address);

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| PicycleError::GpsConnection(format!("Timed out connecting to {}", address)))?
            .map_err(|e| PicycleError::GpsConnection(format!("Failed to connect to {}: {}", address, e)))?;

        let (read_half, write_half) = stream.into_split();
        let mut connection = Connection {
            reader: BufReader::new(read_half),
            writer: write_half,
        };

        connection.read_reply("VERSION", timeout).await?;
        connection.send(WATCH_COMMAND).await?;
        connection.read_reply("WATCH", timeout).await?;

        info!("Connected to gpsd at {}", address);
        Ok(Self {
            connection: Mutex::new(connection),
            address,
            timeout,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl PositionSource for GpsdClient {
    async fn current_fix(&self) -> Result<Fix> {
        let mut connection = self.connection.lock().await;
        connection.send(POLL_COMMAND).await?;
        let line = connection.read_reply("POLL", self.timeout).await?;
        parse_poll(line.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const POLL_3D: &str = r#"{"class":"POLL","time":"2024-05-04T17:20:11.000Z","active":1,"tpv":[{"class":"TPV","device":"/dev/ttyACM0","mode":3,"time":"2024-05-04T17:20:10.000Z","lat":35.0844,"lon":-106.6504,"alt":1619.2,"track":271.5,"speed":4.12,"climb":-0.3}],"sky":[{"class":"SKY","satellites":[{"PRN":1,"used":true},{"PRN":3,"used":true},{"PRN":7,"used":false},{"PRN":9,"used":true},{"PRN":11,"used":true}]}]}"#;

    const POLL_NO_FIX: &str = r#"{"class":"POLL","time":"2024-05-04T17:20:11.000Z","active":1,"tpv":[{"class":"TPV","mode":1}],"sky":[{"class":"SKY","satellites":[{"PRN":1,"used":false},{"PRN":3,"used":false}]}]}"#;

    #[test]
    fn test_parse_3d_poll() {
        let fix = parse_poll(POLL_3D).unwrap();
        assert_eq!(fix.mode, FixMode::ThreeD);
        assert_eq!(fix.satellites, 5);
        assert_eq!(fix.satellites_used, 4);
        assert_eq!(fix.latitude, Some(35.0844));
        assert_eq!(fix.longitude, Some(-106.6504));
        assert_eq!(fix.altitude, Some(1619.2));
        assert_eq!(fix.track, Some(271.5));
        assert_eq!(fix.speed, Some(4.12));
        assert_eq!(fix.climb, Some(-0.3));
        assert_eq!(
            fix.time.unwrap().to_rfc3339(),
            "2024-05-04T17:20:10+00:00"
        );
        assert!(fix.reading().is_ok());
    }

    #[test]
    fn test_parse_no_fix_poll() {
        let fix = parse_poll(POLL_NO_FIX).unwrap();
        assert_eq!(fix.mode, FixMode::NoFix);
        assert_eq!(fix.satellites, 2);
        assert_eq!(fix.satellites_used, 0);
        assert!(fix.latitude.is_none());
        assert!(fix.reading().is_err());
    }

    #[test]
    fn test_parse_empty_poll() {
        // gpsd with no active device
        let fix = parse_poll(r#"{"class":"POLL","active":0,"tpv":[],"sky":[]}"#).unwrap();
        assert_eq!(fix, Fix::no_fix(0));
    }

    #[test]
    fn test_parse_prefers_counts_and_msl_altitude() {
        let line = r#"{"class":"POLL","tpv":[{"mode":3,"altMSL":12.5,"altHAE":40.0}],"sky":[{"nSat":14,"uSat":9,"satellites":[]}]}"#;
        let fix = parse_poll(line).unwrap();
        assert_eq!(fix.satellites, 14);
        assert_eq!(fix.satellites_used, 9);
        assert_eq!(fix.altitude, Some(12.5));
    }

    #[test]
    fn test_parse_rejects_bad_time() {
        let line = r#"{"class":"POLL","tpv":[{"mode":3,"time":"yesterday"}],"sky":[]}"#;
        assert!(matches!(parse_poll(line), Err(PicycleError::GpsProtocol(_))));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_poll("not json"), Err(PicycleError::GpsProtocol(_))));
    }

    /// Fake gpsd: banner, handshake, then one canned reply per `?POLL;`
    async fn fake_gpsd(replies: Vec<&'static str>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();

            write_half
                .write_all(b"{\"class\":\"VERSION\",\"release\":\"3.25\",\"proto_major\":3,\"proto_minor\":15}\n")
                .await
                .unwrap();

            let watch = lines.next_line().await.unwrap().unwrap();
            assert!(watch.starts_with("?WATCH="));
            write_half
                .write_all(b"{\"class\":\"DEVICES\",\"devices\":[]}\n{\"class\":\"WATCH\",\"enable\":true}\n")
                .await
                .unwrap();

            for reply in replies {
                let poll = lines.next_line().await.unwrap().unwrap();
                assert_eq!(poll, "?POLL;");
                write_half.write_all(reply.as_bytes()).await.unwrap();
                write_half.write_all(b"\n").await.unwrap();
            }
        });

        port
    }

    #[tokio::test]
    async fn test_connect_and_poll() {
        let port = fake_gpsd(vec![POLL_NO_FIX, POLL_3D]).await;
        let client = GpsdClient::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(client.address(), format!("127.0.0.1:{}", port));

        let first = client.current_fix().await.unwrap();
        assert_eq!(first.mode, FixMode::NoFix);

        let second = client.current_fix().await.unwrap();
        assert_eq!(second.mode, FixMode::ThreeD);
    }

    #[tokio::test]
    async fn test_poll_after_daemon_exit_is_connection_error() {
        let port = fake_gpsd(vec![]).await;
        let client = GpsdClient::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();

        // The fake closes the socket once it runs out of replies
        let result = client.current_fix().await;
        assert!(matches!(result, Err(PicycleError::GpsConnection(_))));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = GpsdClient::connect("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(PicycleError::GpsConnection(_))));
    }

    // Integration test - only runs with a live gpsd
    #[tokio::test]
    #[ignore]
    async fn test_live_gpsd() {
        let client = GpsdClient::connect("127.0.0.1", GPSD_DEFAULT_PORT, Duration::from_secs(2))
            .await
            .expect("gpsd not running");
        let fix = client.current_fix().await.unwrap();
        println!("{:?}", fix);
    }
}
