//! Signaling dry run: joins a room through the relay using the in-memory
//! peer connection and capture adapters, and prints what happens.
//!
//! Commands on stdin: `video on|off`, `mute`, `pause`, `share`, `unshare`,
//! `send <path>`, `leave`, `quit`.
use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::{env, fs, process, thread};

use bytes::Bytes;

use meshrtc::config::{Config, MeshSettings, TransferSettings};
use meshrtc::log::log_sink::LogSink;
use meshrtc::log::logger::Logger;
use meshrtc::media::mock::{CaptureRequest, MockCaptureDevice};
use meshrtc::media::{CaptureEvent, TrackSource};
use meshrtc::mesh::mock::MockFactory;
use meshrtc::session::{ClientEvent, MeshSession, SessionCommand, SessionNotice};
use meshrtc::signaling_client::{ClientOptions, SignalingClient, SignalingOutbox};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        eprintln!("Usage: {} RELAY_ADDR ROOM [CONFIG]", args[0]);
        process::exit(1);
    }
    let config = match args.get(3) {
        Some(path) => Config::load(path).unwrap_or_else(|e| {
            eprintln!("{e}");
            process::exit(1);
        }),
        None => Config::empty(),
    };

    let logger = Logger::start_client(1024, &config);
    let log: Arc<dyn LogSink> = Arc::new(logger.handle());

    let (tx, rx) = MeshSession::channel();
    let options = ClientOptions {
        origin: "meshrtc://mesh_client".into(),
        ..ClientOptions::default()
    };
    let client = match SignalingClient::connect(&args[1], &options, tx.clone(), log.clone()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("could not reach relay {}: {e}", args[1]);
            process::exit(1);
        }
    };
    println!("connected as {}", client.session_id());

    let device = MockCaptureDevice::new();
    let session = MeshSession::new(
        client.session_id().clone(),
        Arc::new(client) as Arc<dyn SignalingOutbox>,
        Box::new(MockFactory::new()),
        Box::new(device.clone()),
        MeshSettings::from_config(&config),
        TransferSettings::from_config(&config),
        log,
    );
    let storage = TransferSettings::from_config(&config).storage_path;

    let (notice_tx, notice_rx) = std::sync::mpsc::channel();
    let session_thread = thread::spawn(move || session.run(rx, notice_tx));

    let printer = thread::spawn(move || {
        for notice in notice_rx {
            match notice {
                SessionNotice::FileReceived(file) => match file.save_into(&storage) {
                    Ok(path) => println!("received {} -> {}", file.name, path.display()),
                    Err(e) => println!("received {} but could not save: {e}", file.name),
                },
                other => println!("{other:?}"),
            }
        }
    });

    let _ = tx.send(SessionCommand::JoinRoom(args[2].clone()).into());
    read_commands(&tx, &device);

    let _ = tx.send(SessionCommand::Shutdown.into());
    let _ = session_thread.join();
    let _ = printer.join();
}

fn read_commands(tx: &Sender<ClientEvent>, device: &MockCaptureDevice) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let mut words = line.split_whitespace();
        let cmd = match (words.next(), words.next()) {
            (Some("video"), Some(v)) => SessionCommand::SetVideoEnabled(v == "on"),
            (Some("mute"), _) => SessionCommand::ToggleMute,
            (Some("pause"), _) => SessionCommand::ToggleVideo,
            (Some("share"), _) => SessionCommand::StartScreenShare,
            (Some("unshare"), _) => SessionCommand::StopScreenShare,
            (Some("leave"), _) => SessionCommand::LeaveRoom,
            (Some("send"), Some(path)) => match fs::read(path) {
                Ok(data) => SessionCommand::SendFile {
                    name: path.to_string(),
                    data: Bytes::from(data),
                },
                Err(e) => {
                    eprintln!("cannot read {path}: {e}");
                    continue;
                }
            },
            (Some("quit"), _) => return,
            _ => {
                eprintln!("unknown command: {line}");
                continue;
            }
        };
        if tx.send(cmd.into()).is_err() {
            return;
        }
        // the mock device grants every capture request immediately
        if let Some(ev) = grant(device) {
            let _ = tx.send(ev.into());
        }
    }
}

fn grant(device: &MockCaptureDevice) -> Option<CaptureEvent> {
    // wait for the session thread to issue the request
    thread::sleep(std::time::Duration::from_millis(20));
    match device.last_request()? {
        CaptureRequest::UserMedia {
            request,
            constraints,
        } => Some(CaptureEvent::UserMedia {
            request,
            result: Ok(device.stream(constraints)),
        }),
        CaptureRequest::Display { request } => Some(CaptureEvent::DisplayMedia {
            request,
            result: Ok(device.track(TrackSource::Screen)),
        }),
    }
}
