// sbdctl -- command-line control utility for Iridium SBD modems.
//
// Status output goes to stderr as shell-compatible KEY=VALUE lines. Binary
// message bodies are read from stdin and written to stdout.
//
// Usage:
//   sbdctl info
//   sbdctl --port /dev/ttyUSB0 status
//   sbdctl twrite "position 42.1,-71.3"
//   sbdctl dwrite < report.bin && sbdctl connect
//   sbdctl dread | hexdump -C
//   sbdctl clear all

mod logging;

use std::io::{self, Read, Write};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use sbdlink::at::frame::MAX_PAYLOAD;
use sbdlink::transport::{DEFAULT_BAUD, DEFAULT_PORT};
use sbdlink::{BufferTarget, ModemBuilder, ModemInfo, SbdModem, SbdStatus, SessionResult};

use crate::logging::{LogLevel, init_logging};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Control utility for Iridium short-burst-data modems.
#[derive(Parser)]
#[command(name = "sbdctl", version, about)]
struct Cli {
    /// Serial port the modem is attached to.
    #[arg(short, long, env = "SBDPORT", default_value = DEFAULT_PORT)]
    port: String,

    /// Serial baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Wall-clock budget for ordinary commands, in seconds.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Wall-clock budget for a satellite session, in seconds.
    #[arg(long, default_value_t = 65)]
    session_timeout: u64,

    /// Retries for idempotent commands that time out or fail a checksum.
    #[arg(long, default_value_t = 1)]
    retries: u32,

    /// Skip the line setup string sent on open.
    #[arg(long)]
    no_init: bool,

    /// Log verbosity (RUST_LOG overrides).
    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump identity, signal, position, time, and queue status.
    Info,
    /// Report local MO and MT queue status.
    Status,
    /// Request a fresh signal strength reading.
    Rssi,
    /// Open a satellite session to send MO and receive MT.
    Connect,
    /// Read the MT buffer as text.
    Tread,
    /// Read the MT buffer as binary and write it to stdout.
    Dread,
    /// Store a text message in the MO buffer (stdin when omitted).
    Twrite {
        /// Message text.
        text: Option<String>,
    },
    /// Store a binary message from stdin in the MO buffer.
    Dwrite {
        /// Read exactly this many bytes instead of reading to EOF.
        #[arg(long)]
        len: Option<usize>,
    },
    /// Clear the MO buffer, the MT buffer, or both.
    Clear {
        #[arg(value_enum)]
        target: ClearTarget,
    },
    /// Reset the MO message sequence number.
    ClearIndex,
    /// Copy the MO buffer into the MT buffer.
    Copy,
    /// Turn unsolicited event reporting on or off.
    Events {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ClearTarget {
    Mo,
    Mt,
    All,
}

impl From<ClearTarget> for BufferTarget {
    fn from(target: ClearTarget) -> Self {
        match target {
            ClearTarget::Mo => BufferTarget::Mo,
            ClearTarget::Mt => BufferTarget::Mt,
            ClearTarget::All => BufferTarget::Both,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Toggle {
    On,
    Off,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    emit(&[kv("SBDPORT", &cli.port)]);

    let mut modem = ModemBuilder::new()
        .serial_port(&cli.port)
        .baud_rate(cli.baud)
        .command_timeout(Duration::from_secs(cli.timeout))
        .session_timeout(Duration::from_secs(cli.session_timeout))
        .max_retries(cli.retries)
        .initialize(!cli.no_init)
        .build()
        .await
        .with_context(|| format!("failed to open modem on {}", cli.port))?;

    let outcome = run(&mut modem, cli.command).await;
    if let Err(e) = modem.close().await {
        tracing::warn!(error = %e, "close failed");
    }
    outcome
}

async fn run(modem: &mut SbdModem, command: Command) -> Result<()> {
    match command {
        Command::Info => {
            let info = modem.info().await.context("info query failed")?;
            emit(&info_lines(&info));
        }
        Command::Status => {
            let status = modem.extended_status().await.context("status query failed")?;
            emit(&status_lines(&status));
        }
        Command::Rssi => {
            let rssi = modem.signal_quality().await.context("signal query failed")?;
            emit(&[kv("RSSI", rssi)]);
        }
        Command::Connect => {
            let session = modem.open_session().await.context("session failed")?;
            emit(&session_lines(&session));
        }
        Command::Tread => {
            let text = modem.read_text().await.context("text read failed")?;
            emit(&[format!("TEXT_MESSAGE={text:?}")]);
        }
        Command::Dread => {
            let payload = modem.read_binary().await.context("binary read failed")?;
            emit(&[kv("MT_BYTES", payload.len())]);
            let mut stdout = io::stdout().lock();
            stdout.write_all(&payload)?;
            stdout.flush()?;
        }
        Command::Twrite { text } => {
            let text = match text {
                Some(text) => text,
                None => read_stdin_text()?,
            };
            modem.write_text(&text).await.context("text write failed")?;
            emit(&[kv("MO_BYTES", text.len())]);
        }
        Command::Dwrite { len } => {
            let payload = read_stdin_payload(io::stdin().lock(), len)?;
            modem.write_binary(&payload).await.context("binary write failed")?;
            emit(&[kv("MO_BYTES", payload.len())]);
        }
        Command::Clear { target } => {
            let target = BufferTarget::from(target);
            modem
                .clear_buffers(target)
                .await
                .with_context(|| format!("clearing {target} buffer failed"))?;
            emit(&[kv("CLEARED", target)]);
        }
        Command::ClearIndex => {
            modem.clear_mo_sequence().await.context("sequence reset failed")?;
            emit(&[kv("MO_SEQ_CLEARED", 1)]);
        }
        Command::Copy => {
            let n = modem.copy_mo_to_mt().await.context("copy failed")?;
            emit(&[kv("MOMTCP_BYTES", n)]);
        }
        Command::Events { state } => {
            let on = matches!(state, Toggle::On);
            modem.set_event_reporting(on).await.context("event setup failed")?;
            emit(&[kv("EVENTS", u8::from(on))]);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

fn read_stdin_text() -> Result<String> {
    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("failed to read message from stdin")?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

/// Read a binary payload, either exactly `len` bytes or everything to EOF.
fn read_stdin_payload(mut input: impl Read, len: Option<usize>) -> Result<Vec<u8>> {
    match len {
        Some(n) => {
            if n == 0 || n > MAX_PAYLOAD {
                bail!("payload length must be 1..={MAX_PAYLOAD}, got {n}");
            }
            let mut buf = vec![0u8; n];
            input
                .read_exact(&mut buf)
                .with_context(|| format!("expected {n} bytes on stdin"))?;
            Ok(buf)
        }
        None => {
            let mut buf = Vec::new();
            input
                .take(MAX_PAYLOAD as u64 + 1)
                .read_to_end(&mut buf)
                .context("failed to read payload from stdin")?;
            Ok(buf)
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn kv(key: &str, value: impl std::fmt::Display) -> String {
    format!("{key}={value}")
}

fn emit(lines: &[String]) {
    let mut stderr = io::stderr().lock();
    for line in lines {
        let _ = writeln!(stderr, "{line}");
    }
}

fn status_lines(status: &SbdStatus) -> Vec<String> {
    let mut lines = vec![
        kv("MSG_OUT_WAIT", u8::from(status.mo_flag)),
        kv("MSG_OUT_SEQ_NUM", status.momsn),
        kv("MSG_IN_WAIT", u8::from(status.mt_flag)),
        kv("MSG_IN_SEQ_NUM", status.mtmsn),
    ];
    if let Some(ring) = status.ring_alert {
        lines.push(kv("RING_ALERT", u8::from(ring)));
    }
    if let Some(queued) = status.queued {
        lines.push(kv("MESSAGES_ON_SERVER", queued));
    }
    lines
}

fn session_lines(session: &SessionResult) -> Vec<String> {
    vec![
        kv("MO_STATUS", session.mo_status),
        format!("MO_STATUS_STR={:?}", session.mo_status_text()),
        kv("MO_SEQ_NUM", session.momsn),
        kv("MT_STATUS", session.mt_status),
        kv("MT_SEQ_NUM", session.mtmsn),
        kv("MT_LENGTH", session.mt_length),
        kv("MESSAGES_ON_SERVER", session.mt_queued),
    ]
}

fn info_lines(info: &ModemInfo) -> Vec<String> {
    let mut lines = vec![
        format!("MODEM_FIRMWARE={:?}", info.firmware),
        format!("MODEM_HARDWARE={:?}", info.hardware),
        format!("MODEM_HW_INFO={:?}", info.hardware_spec),
        kv("IMEI", &info.imei),
        kv("RSSI", info.signal),
        format!("GW_TYPE={:?}", info.gateway),
    ];
    match info.geolocation {
        Some(geo) => lines.push(format!(
            "RAW_MSGEO={},{},{},0x{:x}",
            geo.x, geo.y, geo.z, geo.timestamp
        )),
        None => lines.push(kv("RAW_MSGEO", "none")),
    }
    match info.system_time {
        Some(ticks) => lines.push(format!("MSSTM=0x{ticks:x}")),
        None => lines.push(kv("MSSTM", "none")),
    }
    let status = &info.status;
    lines.push(kv("INBOX_STATUS", u8::from(status.mt_flag)));
    lines.push(kv("OUTBOX_PENDING", u8::from(status.mo_flag)));
    lines.push(kv("SERVER_MSG_PENDING", status.queued.unwrap_or(0)));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbdlink::Geolocation;

    fn sample_status() -> SbdStatus {
        SbdStatus {
            mo_flag: true,
            momsn: 12,
            mt_flag: false,
            mtmsn: -1,
            ring_alert: Some(false),
            queued: Some(3),
        }
    }

    #[test]
    fn cli_parses_global_flags_and_subcommand() {
        let cli = Cli::try_parse_from([
            "sbdctl",
            "--port",
            "/dev/ttyUSB1",
            "--retries",
            "2",
            "--log-level",
            "debug",
            "clear",
            "mt",
        ])
        .unwrap();
        assert_eq!(cli.port, "/dev/ttyUSB1");
        assert_eq!(cli.retries, 2);
        assert!(matches!(
            cli.command,
            Command::Clear {
                target: ClearTarget::Mt
            }
        ));
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["sbdctl", "rssi"]).unwrap();
        assert_eq!(cli.baud, DEFAULT_BAUD);
        assert_eq!(cli.timeout, 10);
        assert_eq!(cli.session_timeout, 65);
        assert!(!cli.no_init);
    }

    #[test]
    fn cli_rejects_unknown_clear_target() {
        assert!(Cli::try_parse_from(["sbdctl", "clear", "inbox"]).is_err());
    }

    #[test]
    fn clear_all_maps_to_both_buffers() {
        assert_eq!(BufferTarget::from(ClearTarget::All), BufferTarget::Both);
        assert_eq!(BufferTarget::from(ClearTarget::Mo), BufferTarget::Mo);
    }

    #[test]
    fn status_lines_include_extended_fields() {
        let lines = status_lines(&sample_status());
        assert_eq!(
            lines,
            vec![
                "MSG_OUT_WAIT=1",
                "MSG_OUT_SEQ_NUM=12",
                "MSG_IN_WAIT=0",
                "MSG_IN_SEQ_NUM=-1",
                "RING_ALERT=0",
                "MESSAGES_ON_SERVER=3",
            ]
        );
    }

    #[test]
    fn status_lines_omit_missing_extended_fields() {
        let mut status = sample_status();
        status.ring_alert = None;
        status.queued = None;
        assert_eq!(status_lines(&status).len(), 4);
    }

    #[test]
    fn session_lines_describe_mo_status() {
        let session = SessionResult {
            mo_status: 32,
            momsn: 5,
            mt_status: 0,
            mtmsn: 0,
            mt_length: 0,
            mt_queued: 0,
        };
        let lines = session_lines(&session);
        assert_eq!(lines[0], "MO_STATUS=32");
        assert!(lines[1].starts_with("MO_STATUS_STR=\""));
        assert_eq!(lines[6], "MESSAGES_ON_SERVER=0");
    }

    #[test]
    fn info_lines_format_hex_fields() {
        let info = ModemInfo {
            firmware: "TA16005".into(),
            hardware: "IRIDIUM 9600 Family SBD Transceiver".into(),
            hardware_spec: "Version: 9602NrvA-D".into(),
            imei: "300234010753370".into(),
            signal: 4,
            gateway: "EMSS".into(),
            geolocation: Some(Geolocation {
                x: 1,
                y: -2,
                z: 3,
                timestamp: 0xBEEF,
            }),
            system_time: None,
            status: sample_status(),
        };
        let lines = info_lines(&info);
        assert!(lines.contains(&"IMEI=300234010753370".to_string()));
        assert!(lines.contains(&"RAW_MSGEO=1,-2,3,0xbeef".to_string()));
        assert!(lines.contains(&"MSSTM=none".to_string()));
        assert!(lines.contains(&"SERVER_MSG_PENDING=3".to_string()));
    }

    #[test]
    fn payload_reads_exact_length() {
        let payload = read_stdin_payload(&b"HELLO WORLD"[..], Some(5)).unwrap();
        assert_eq!(payload, b"HELLO");
    }

    #[test]
    fn payload_short_input_is_an_error() {
        assert!(read_stdin_payload(&b"HI"[..], Some(5)).is_err());
    }

    #[test]
    fn payload_length_bounds_checked() {
        assert!(read_stdin_payload(&b""[..], Some(0)).is_err());
        assert!(read_stdin_payload(&b""[..], Some(MAX_PAYLOAD + 1)).is_err());
    }

    #[test]
    fn payload_to_eof_is_capped_past_the_limit() {
        let input = vec![0xAAu8; 1000];
        let payload = read_stdin_payload(&input[..], None).unwrap();
        assert_eq!(payload.len(), MAX_PAYLOAD + 1);
    }
}
