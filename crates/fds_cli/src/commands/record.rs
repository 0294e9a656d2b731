//! Record commands: write, read and clear.

use super::{print_json, Layout, OutputFormat, Session};
use crate::error::{CliError, CliResult};
use fds_core::{Bytes, FindToken, RecordId, RecordKey, StoreError, StoreEvent};
use fds_flash::WORD_SIZE;
use serde::Serialize;
use std::path::Path;

/// A record printed by `read`.
#[derive(Debug, Serialize)]
pub struct RecordOutput {
    /// Record id.
    pub record_id: u32,
    /// Payload length in words.
    pub length_words: u16,
    /// Payload as lowercase hex.
    pub hex: String,
    /// Payload as text, trailing zero padding removed.
    pub text: String,
}

/// Builds a payload from `--hex` or `--text`, zero padded to whole words.
pub fn parse_payload(hex: Option<&str>, text: Option<&str>) -> CliResult<Vec<u8>> {
    let mut payload = match (hex, text) {
        (Some(hex), None) => decode_hex(hex)?,
        (None, Some(text)) => text.as_bytes().to_vec(),
        _ => return Err(CliError::Input("give exactly one of --hex or --text".into())),
    };
    if payload.is_empty() {
        return Err(CliError::Input("payload is empty".into()));
    }
    let word = WORD_SIZE as usize;
    payload.resize(payload.len().div_ceil(word) * word, 0);
    Ok(payload)
}

fn decode_hex(hex: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = hex
        .trim_start_matches("0x")
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::Input("hex payload has an odd number of digits".into()));
    }
    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| CliError::Input(format!("invalid hex byte {:?}", pair)))
        })
        .collect()
}

fn encode_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

/// Writes one record and prints its id.
pub fn write(
    path: &Path,
    layout: Layout,
    record_type: u16,
    instance: u16,
    payload: &[u8],
) -> CliResult<RecordId> {
    let session = Session::mount(path, layout)?;
    let key = RecordKey::new(record_type, instance);
    let descriptor = session
        .store
        .write(key, &[Bytes::copy_from_slice(payload)])?;
    session.settle()?;
    let id = descriptor.record_id();
    println!("Wrote record {} ({} words)", id.as_u32(), payload.len() / WORD_SIZE as usize);
    Ok(id)
}

pub(crate) fn read_records(
    path: &Path,
    layout: Layout,
    record_type: u16,
    instance: u16,
) -> CliResult<Vec<RecordOutput>> {
    let session = Session::mount(path, layout)?;
    let store = &session.store;
    let mut token = FindToken::new();
    let mut records = Vec::new();
    loop {
        let mut descriptor = match store.find(record_type, instance, &mut token) {
            Ok(descriptor) => descriptor,
            Err(StoreError::NotFound) => break,
            Err(err) => return Err(err.into()),
        };
        let view = store.open(&mut descriptor)?;
        store.close(&descriptor)?;

        let trimmed = view
            .data
            .iter()
            .rposition(|&b| b != 0)
            .map_or(&view.data[..0], |end| &view.data[..=end]);
        records.push(RecordOutput {
            record_id: view.record_id().as_u32(),
            length_words: view.header.length_words,
            hex: encode_hex(&view.data),
            text: String::from_utf8_lossy(trimmed).into_owned(),
        });
    }
    Ok(records)
}

/// Prints every record with the given key.
pub fn read(
    path: &Path,
    layout: Layout,
    record_type: u16,
    instance: u16,
    format: OutputFormat,
) -> CliResult<()> {
    let records = read_records(path, layout, record_type, instance)?;
    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No records with type {record_type:#06x} instance {instance:#06x}");
            }
            for record in &records {
                println!(
                    "{:>10}  {:>5} words  {}  {:?}",
                    record.record_id, record.length_words, record.hex, record.text
                );
            }
        }
    }
    Ok(())
}

/// Clears one record by id, or every record of an instance.
pub fn clear(path: &Path, layout: Layout, id: Option<u32>, instance: Option<u16>) -> CliResult<u32> {
    let session = Session::mount(path, layout)?;
    match (id, instance) {
        (Some(id), None) => {
            let descriptor = session.store.descriptor_from_id(RecordId::new(id));
            session.store.clear(&descriptor)?;
        }
        (None, Some(instance)) => session.store.clear_by_instance(instance)?,
        _ => return Err(CliError::Input("give exactly one of --id or --instance".into())),
    }

    let mut cleared = 0;
    for event in session.settle()? {
        match event {
            StoreEvent::Clear { .. } => cleared += 1,
            StoreEvent::ClearInstance { cleared: n, .. } => cleared += n,
            _ => {}
        }
    }
    println!("Cleared {cleared} record(s)");
    Ok(cleared)
}
