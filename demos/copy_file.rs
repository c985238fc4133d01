// Copies one file into another by streaming it through a shared file mapping.
//
//     cargo run --example copy_file -- <source> <destination>



use std::fs::File;

use mmapio::{AccessFlags, MapCfg, MappingFlags};



fn main() {
    let mut args = std::env::args().skip(1);
    let (Some(source), Some(destination)) = (args.next(), args.next()) else {
        eprintln!("usage: copy_file <source> <destination>");
        std::process::exit(2);
    };

    let mut input = File::open(&source).unwrap();
    let len = input.metadata().unwrap().len() as usize;
    if len == 0 {
        // A mapping can't be empty, so there is nothing to map.
        File::create(&destination).unwrap();
        println!("`{source}` is empty; created an empty `{destination}`");
        return;
    }

    // `overwrite` drops whatever the destination held, so the mapping ends up exactly `len`
    // bytes long.
    let mut mapping = MapCfg::new()
        .path(&destination)
        .access(AccessFlags::READ | AccessFlags::WRITE)
        .mapping(MappingFlags::SHARED)
        .size(len)
        .overwrite(true)
        .create()
        .unwrap();

    {
        let mut sink = mapping.sink();
        let copied = sink.write_from(&mut input, len).unwrap();
        sink.flush().unwrap();
        println!("copied {copied} bytes from `{source}` to `{destination}`");
    }

    mapping.close().unwrap();
}
