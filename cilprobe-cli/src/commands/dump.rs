use std::path::Path;

use cilprobe::{metadata::method::ExceptionHandlerKind, rewriter::Method};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_method},
    output::{il_label, print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct MethodDump {
    pub file: String,
    pub input_size: usize,
    pub fat_input: bool,
    pub max_stack: u16,
    pub init_locals: bool,
    pub local_var_sig_token: String,
    pub code_size: usize,
    pub method_size: usize,
    pub instructions: Vec<InstructionInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<RegionInfo>,
}

#[derive(Debug, Serialize)]
pub struct InstructionInfo {
    pub offset: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_offset: Option<i64>,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct RegionInfo {
    pub kind: String,
    pub try_start: i64,
    pub try_end: i64,
    pub handler_start: i64,
    pub handler_end: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_token: Option<String>,
}

pub fn describe(path: &Path, input_size: usize, method: &Method) -> MethodDump {
    let instructions = method
        .instructions()
        .map(|instruction| {
            let text = instruction.to_string();
            InstructionInfo {
                offset: instruction.offset(),
                original_offset: Some(instruction.original_offset()).filter(|o| *o >= 0),
                text: text
                    .split_once(": ")
                    .map_or(text.clone(), |(_, rest)| rest.to_string()),
            }
        })
        .collect();

    let offset = |id| method.get(id).map_or(-1, |i| i.offset());
    let regions = method
        .regions()
        .iter()
        .map(|region| RegionInfo {
            kind: match region.kind {
                ExceptionHandlerKind::Catch => "catch",
                ExceptionHandlerKind::Filter => "filter",
                ExceptionHandlerKind::Finally => "finally",
                ExceptionHandlerKind::Fault => "fault",
            }
            .to_string(),
            try_start: offset(region.try_start),
            try_end: offset(region.try_end),
            handler_start: offset(region.handler_start),
            handler_end: offset(region.handler_end),
            filter_start: region.filter_start.map(offset),
            class_token: region.class_token.map(|token| token.to_string()),
        })
        .collect();

    let header = method.header();
    MethodDump {
        file: file_display_name(path),
        input_size,
        fat_input: header.is_fat(),
        max_stack: method.max_stack(),
        init_locals: header.is_init_local(),
        local_var_sig_token: format!("0x{:08x}", header.local_var_sig_token),
        code_size: method.code_size(),
        method_size: method.method_size(),
        instructions,
        regions,
    }
}

pub fn print_dump(dump: &MethodDump) {
    println!("{}", dump.file);
    println!(
        "  input:      {} bytes, {} header",
        dump.input_size,
        if dump.fat_input { "fat" } else { "tiny" }
    );
    println!(
        "  rewritten:  {} bytes, {} bytes of code",
        dump.method_size, dump.code_size
    );
    println!(
        "  max stack:  {}{}",
        dump.max_stack,
        if dump.init_locals { ", init locals" } else { "" }
    );
    println!("  locals sig: {}", dump.local_var_sig_token);
    println!();

    let mut tw = TabWriter::new(vec![
        ("OFFSET", Align::Right),
        ("ORIGINAL", Align::Right),
        ("INSTRUCTION", Align::Left),
    ])
    .indent("  ");
    for instruction in &dump.instructions {
        tw.row(vec![
            il_label(instruction.offset),
            instruction
                .original_offset
                .map_or_else(|| "injected".to_string(), il_label),
            instruction.text.clone(),
        ]);
    }
    tw.print();

    if !dump.regions.is_empty() {
        println!();
        let mut tw = TabWriter::new(vec![
            ("KIND", Align::Left),
            ("TRY", Align::Left),
            ("HANDLER", Align::Left),
            ("FILTER/CLASS", Align::Left),
        ])
        .indent("  ");
        for region in &dump.regions {
            tw.row(vec![
                region.kind.clone(),
                format!("{}..{}", il_label(region.try_start), il_label(region.try_end)),
                format!(
                    "{}..{}",
                    il_label(region.handler_start),
                    il_label(region.handler_end)
                ),
                region
                    .filter_start
                    .map(il_label)
                    .or_else(|| region.class_token.clone())
                    .unwrap_or_default(),
            ]);
        }
        tw.print();
    }
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let (data, method) = load_method(path)?;
    let dump = describe(path, data.len(), &method);
    print_output(&dump, opts, print_dump)
}
