// Decode a saved capture
//
// Reads a CSV capture (a time column plus one column per channel) and prints
// every I2C or SPI transaction found in it.

use clap::{Parser, ValueEnum};
use logicscope_rs::{decode_i2c, decode_spi, CsvCapture, I2cChannels, SampleCount, SpiChannels};

#[derive(Clone, Copy, ValueEnum)]
enum Protocol {
    I2c,
    Spi,
}

#[derive(Parser)]
#[command(name = "decode_csv")]
#[command(version = "1.0")]
#[command(about = "Decode I2C or SPI transactions from a CSV capture")]
struct Args {
    /// CSV file with a header row
    path: String,

    /// Bus protocol to decode
    #[arg(short, long, value_enum, default_value = "i2c")]
    protocol: Protocol,

    /// Name of the time column
    #[arg(long, default_value = "time")]
    time_column: String,

    /// Channel names, in protocol order (SDA SCL, or MISO MOSI SCK CS)
    #[arg(short, long, num_args = 1..)]
    channels: Vec<String>,

    /// Only decode the first 2000 rows
    #[arg(long)]
    limit: bool,

    /// Print a detailed table for each SPI transaction
    #[arg(long)]
    pretty: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let count = if args.limit {
        SampleCount::Points2000
    } else {
        SampleCount::Max
    };
    let mut source = CsvCapture::new(&args.path).with_time_column(&args.time_column);

    match args.protocol {
        Protocol::I2c => {
            let channels = match args.channels.as_slice() {
                [] => I2cChannels::default(),
                [sda, scl] => I2cChannels::new(sda, scl),
                _ => return Err("I2C needs exactly two channels: SDA SCL".into()),
            };
            let transactions = decode_i2c(&mut source, &channels, count)?;
            println!("{} I2C transaction(s)", transactions.len());
            for transaction in &transactions {
                println!(
                    "  {:.9}s  {}",
                    transaction.span.first_time, transaction
                );
            }
        }
        Protocol::Spi => {
            let channels = match args.channels.as_slice() {
                [] => SpiChannels::default(),
                [miso, mosi, sck, cs] => SpiChannels::new(miso, mosi, sck, cs),
                _ => return Err("SPI needs exactly four channels: MISO MOSI SCK CS".into()),
            };
            let transactions = decode_spi(&mut source, &channels, count)?;
            println!("{} SPI transaction(s)", transactions.len());
            for transaction in &transactions {
                if args.pretty {
                    println!("{}", transaction.pretty());
                } else {
                    println!(
                        "  {:.9}s  {}",
                        transaction.span.first_time, transaction
                    );
                }
            }
        }
    }

    Ok(())
}
