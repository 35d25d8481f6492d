use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, ValueEnum};

use qoi_test::bridge;
use qoi_test::qoi::{qoi_decode, qoi_encode, ChannelMode, Colorspace, QoiDescriptor};

/// Pixel format a file on either side of the conversion is stored in.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Raw,
    Png,
    Qoi,
}

/// Convert images between raw scanlines, PNG, and QOI.
///
/// `-h` is height, not help: pass `-?` or `--help` for this message, to stay
/// compatible with the original `qoic` flag layout.
#[derive(Parser)]
#[command(name = "qoic", disable_help_flag = true)]
struct Cli {
    /// Format of the input file.
    in_format: Format,
    /// Path to the input file.
    infile: PathBuf,
    /// Format of the output file.
    out_format: Format,
    /// Path to the output file.
    outfile: PathBuf,

    /// Image width. Required when `in-format` is `raw`.
    #[arg(short = 'w', long = "width")]
    width: Option<u32>,

    /// Image height. Required when `in-format` is `raw`.
    #[arg(short = 'h', long = "height")]
    height: Option<u32>,

    /// Channel count: 3 (RGB) or 4 (RGBA).
    #[arg(short = 'c', long = "channels", default_value_t = 3)]
    channels: u8,

    /// Colorspace tag: 0 (sRGB, linear alpha) or 1 (all channels linear).
    #[arg(short = 's', long = "colorspace", default_value_t = 0)]
    colorspace: u8,

    /// Show this message.
    #[arg(short = '?', long = "help", action = ArgAction::Help)]
    help: Option<bool>,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("qoic: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let channels = ChannelMode::try_from(cli.channels).context("invalid -c/--channels value")?;
    let colorspace =
        Colorspace::try_from(cli.colorspace).context("invalid -s/--colorspace value")?;

    let (desc, pixels) = match cli.in_format {
        Format::Raw => {
            let (width, height) = match (cli.width, cli.height) {
                (Some(w), Some(h)) => (w, h),
                _ => bail!("-w/--width and -h/--height are required when reading raw input"),
            };
            let desc = QoiDescriptor {
                width: width as usize,
                height: height as usize,
                channels,
                colorspace,
            };
            let pixels = bridge::read_raw(&cli.infile, desc.width, desc.height, channels)
                .with_context(|| format!("reading raw input {:?}", cli.infile))?;
            (desc, pixels)
        }
        Format::Png => {
            let (mut desc, pixels) = bridge::read_png(&cli.infile)
                .with_context(|| format!("reading png input {:?}", cli.infile))?;
            desc.colorspace = colorspace;
            (desc, pixels)
        }
        Format::Qoi => {
            let file = File::open(&cli.infile)
                .with_context(|| format!("opening qoi input {:?}", cli.infile))?;
            let (pixels, desc) = qoi_decode(BufReader::new(file), None)
                .with_context(|| format!("decoding qoi input {:?}", cli.infile))?;
            (desc, pixels)
        }
    };

    match cli.out_format {
        Format::Raw => {
            bridge::write_raw(&cli.outfile, &pixels)
                .with_context(|| format!("writing raw output {:?}", cli.outfile))?;
        }
        Format::Png => {
            bridge::write_png(&cli.outfile, &desc, pixels)
                .with_context(|| format!("writing png output {:?}", cli.outfile))?;
        }
        Format::Qoi => {
            let bytes = qoi_encode(&pixels, &desc)
                .with_context(|| format!("encoding qoi output {:?}", cli.outfile))?;
            std::fs::write(&cli.outfile, bytes)
                .with_context(|| format!("writing qoi output {:?}", cli.outfile))?;
        }
    }

    Ok(())
}
