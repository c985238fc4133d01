// Appends fixed-size records to a file-backed log, growing the mapping a page at a time, and
// then reads them back through a `Source`.



use std::io::Read;

use arrayvec::{ArrayString, ArrayVec};
use mmapio::{page_size, MapCfg, Mapping};



const RECORD_SIZE: usize = 32;
const NAME_SIZE: usize = RECORD_SIZE - 4;

// Records are plain bytes on disk; names are capped so every record has the same size.
struct Record {
    id: u32,
    name: ArrayString<NAME_SIZE>,
}

impl Record {
    fn encode(&self) -> ArrayVec<u8, RECORD_SIZE> {
        let mut bytes = ArrayVec::new();
        bytes.try_extend_from_slice(&self.id.to_le_bytes()).unwrap();
        bytes.try_extend_from_slice(self.name.as_bytes()).unwrap();
        while !bytes.is_full() {
            bytes.push(0);
        }
        bytes
    }

    fn decode(bytes: &[u8; RECORD_SIZE]) -> Self {
        let id = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let name = &bytes[4..];
        let end = name.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
        let name = ArrayString::from(std::str::from_utf8(&name[..end]).unwrap()).unwrap();
        Self { id, name }
    }
}

fn append(mapping: &mut Mapping, count: &mut usize, record: &Record) {
    let offset = *count * RECORD_SIZE;
    // Grow by whole pages rather than one record at a time.
    let needed = (offset + RECORD_SIZE).next_multiple_of(page_size());
    if offset + RECORD_SIZE > mapping.size() && mapping.grow_if_needed(needed).unwrap() {
        println!("grew log to {} bytes", mapping.size());
    }
    mapping.write_bytes(offset, &record.encode()).unwrap();
    *count += 1;
}

fn main() {
    let dir = std::env::temp_dir().join("mmapio_record_log");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("records.bin");

    let mut mapping = MapCfg::new()
        .path(&path)
        .size(RECORD_SIZE)
        .overwrite(true)
        .create()
        .unwrap();

    let names = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot"];
    let mut count = 0;
    for i in 0..(page_size() / RECORD_SIZE + names.len()) {
        let record = Record {
            id: i as u32,
            name: ArrayString::from(names[i % names.len()]).unwrap(),
        };
        append(&mut mapping, &mut count, &record);
    }

    mapping.sync(mmapio::SyncFlags::SYNC).unwrap();

    let mut source = mapping.source_region(0, count * RECORD_SIZE);
    let mut bytes = [0; RECORD_SIZE];
    let mut last = None;
    while source.read_exact(&mut bytes).is_ok() {
        last = Some(Record::decode(&bytes));
    }

    if let Some(record) = last {
        println!("{count} records in `{}`, last is #{} \"{}\"", path.display(), record.id, record.name);
    }
}
