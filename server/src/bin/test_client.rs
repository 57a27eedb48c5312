use clap::Parser;
use shared::protocol::{
    now_millis, BoatAction, ClientType, CustomizeRequestType, FrameReader, Message,
    RegistrationStatus,
};
use shared::DEFAULT_PORT;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

/// Headless bot that joins a race, starts it and sails for a while
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,
    /// Boat name to request
    #[clap(short, long, default_value = "Test Bot")]
    name: String,
    /// Number of one-second steps to sail for
    #[clap(long, default_value_t = 30)]
    steps: u32,
}

async fn send(writer: &mut OwnedWriteHalf, message: &Message) -> Result<(), Box<dyn std::error::Error>> {
    writer.write_all(&message.encode(now_millis())?).await?;
    println!("Sent {:?}", message.message_type());
    Ok(())
}

fn describe(message: &Message) {
    match message {
        Message::RaceStatus(status) => println!(
            "Race status - stage: {:?}, wind: {:.0} deg @ {} mm/s, boats: {}",
            status.stage,
            status.wind_direction,
            status.wind_speed,
            status.boats.len()
        ),
        Message::BoatLocation(location) => println!(
            "  Boat {}: pos=({:.6}, {:.6}) heading={:.0} speed={} mm/s",
            location.source_id,
            location.position.lat,
            location.position.lng,
            location.heading,
            location.speed
        ),
        Message::MarkRounding(rounding) => println!(
            "Boat {} rounded mark {} ({:?})",
            rounding.source_id, rounding.mark_id, rounding.boat_status
        ),
        Message::Chatter { text, .. } => println!("Chatter: {}", text),
        Message::Heartbeat { sequence } => println!("Heartbeat {}", sequence),
        other => println!("Received {:?}", other.message_type()),
    }
}

/// Prints everything that arrives within `window`
async fn listen(reader: &mut FrameReader<BufReader<OwnedReadHalf>>, window: Duration) -> bool {
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, reader.next_frame()).await {
            Err(_) => return true,
            Ok(Err(e)) => {
                println!("Connection closed: {}", e);
                return false;
            }
            Ok(Ok(frame)) => match Message::from_frame(&frame) {
                Ok(message) => describe(&message),
                Err(e) => println!("Failed to decode frame: {}", e),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Connecting to {}", args.server);
    let stream = TcpStream::connect(&args.server).await?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = FrameReader::buffered(read_half);

    send(
        &mut writer,
        &Message::RegistrationRequest {
            client_type: ClientType::Player,
        },
    )
    .await?;

    // Wait for response
    println!("Waiting for server response...");
    let source_id = loop {
        let frame = reader.next_frame().await?;
        match Message::from_frame(&frame)? {
            Message::RegistrationResponse {
                source_id,
                status: RegistrationStatus::SuccessPlaying,
            } => break source_id,
            Message::RegistrationResponse { status, .. } => {
                println!("Registration refused: {:?}", status);
                return Ok(());
            }
            other => describe(&other),
        }
    };
    println!("Registered with source id {}", source_id);

    send(
        &mut writer,
        &Message::CustomizeRequest {
            request: CustomizeRequestType::Name,
            source_id,
            data: args.name.clone().into_bytes(),
        },
    )
    .await?;

    // Only has an effect when this bot is the host
    send(
        &mut writer,
        &Message::Chatter {
            message_type: 1,
            text: format!("{}: /start", args.name),
        },
    )
    .await?;
    send(
        &mut writer,
        &Message::BoatAction {
            action: BoatAction::SailsIn,
            source_id,
        },
    )
    .await?;

    let pattern = [
        BoatAction::Vmg,
        BoatAction::Upwind,
        BoatAction::Upwind,
        BoatAction::Downwind,
        BoatAction::TackGybe,
    ];
    for step in 0..args.steps {
        let action = pattern[step as usize % pattern.len()];
        send(&mut writer, &Message::BoatAction { action, source_id }).await?;

        if !listen(&mut reader, Duration::from_secs(1)).await {
            break;
        }
    }

    send(
        &mut writer,
        &Message::BoatAction {
            action: BoatAction::SailsOut,
            source_id,
        },
    )
    .await?;
    sleep(Duration::from_millis(100)).await;
    writer.shutdown().await?;

    println!("Test client finished");
    Ok(())
}
