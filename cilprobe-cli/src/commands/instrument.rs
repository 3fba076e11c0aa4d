use std::path::Path;

use anyhow::{bail, Context};
use cilprobe::{
    coverage::{
        instrument, is_already_instrumented, InstrumentationConfig, InstrumentationPoints,
        PointerWidth, Probe, ProbeStyle,
    },
    metadata::token::Token,
};
use log::{info, warn};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_method, parse_number, parse_token},
    output::print_output,
};

pub struct InstrumentOptions<'a> {
    pub points: &'a Path,
    pub token: Option<&'a str>,
    pub function: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub pointer32: bool,
    pub output: &'a Path,
    pub sequence: bool,
    pub branches: bool,
    pub force: bool,
    pub extra_max_stack: u16,
    pub global: &'a GlobalOptions,
}

#[derive(Debug, Serialize)]
pub struct InstrumentReport {
    pub input: String,
    pub output: String,
    pub already_instrumented: bool,
    pub sequence_points: usize,
    pub branch_points: usize,
    pub input_size: usize,
    pub output_size: usize,
    pub max_stack: u16,
}

fn resolve_probe(opts: &InstrumentOptions) -> anyhow::Result<(Probe, ProbeStyle)> {
    match (opts.token, opts.function, opts.signature) {
        (Some(token), None, None) => Ok((
            Probe::Managed {
                method: Token::new(parse_token(token)?),
            },
            ProbeStyle::Managed,
        )),
        (None, Some(function), Some(signature)) => {
            let width = if opts.pointer32 {
                PointerWidth::Bits32
            } else {
                PointerWidth::Bits64
            };
            Ok((
                Probe::Unmanaged {
                    function: parse_number(function)?,
                    signature: Token::new(parse_token(signature)?),
                    width,
                },
                ProbeStyle::Unmanaged(width),
            ))
        }
        _ => bail!("either --token or --function with --signature is required"),
    }
}

pub fn run(path: &Path, opts: &InstrumentOptions) -> anyhow::Result<()> {
    let (probe, style) = resolve_probe(opts)?;

    let text = std::fs::read_to_string(opts.points)
        .with_context(|| format!("failed to read points: {}", opts.points.display()))?;
    let points: InstrumentationPoints = text
        .parse()
        .with_context(|| format!("failed to parse points: {}", opts.points.display()))?;

    let (data, mut method) = load_method(path)?;

    let config = InstrumentationConfig::default()
        .with_sequence_points(opts.sequence)
        .with_branch_points(opts.branches)
        .with_skip_instrumented(!opts.force)
        .with_extra_max_stack(opts.extra_max_stack)
        .with_probe(style);

    let already = config.skip_instrumented && is_already_instrumented(&method, &points, &probe);

    let placed = if already {
        warn!("{} already carries its probes, writing it unchanged", path.display());
        Default::default()
    } else {
        instrument(&mut method, &points, &probe, &config)
            .with_context(|| format!("failed to instrument {}", path.display()))?
    };

    let body = if already { data.clone() } else { method.to_bytes()? };
    std::fs::write(opts.output, &body)
        .with_context(|| format!("failed to write body: {}", opts.output.display()))?;
    info!("Wrote {} bytes to {}", body.len(), opts.output.display());

    let report = InstrumentReport {
        input: file_display_name(path),
        output: file_display_name(opts.output),
        already_instrumented: already,
        sequence_points: placed.sequence_points,
        branch_points: placed.branch_points,
        input_size: data.len(),
        output_size: body.len(),
        max_stack: method.max_stack(),
    };

    print_output(&report, opts.global, |report| {
        println!("{} -> {}", report.input, report.output);
        if report.already_instrumented {
            println!("  already instrumented");
        }
        println!("  statement probes: {}", report.sequence_points);
        println!("  branch probes:    {}", report.branch_points);
        println!(
            "  size:             {} -> {} bytes",
            report.input_size, report.output_size
        );
        println!("  max stack:        {}", report.max_stack);
    })
}
