// Walks an anonymous mapping through a few protection changes, then pins it in memory.



use mmapio::{page_size, AccessFlags, Error, Mapping, MappingFlags};



fn main() {
    let read_write = AccessFlags::READ | AccessFlags::WRITE;
    let mut mapping = Mapping::anonymous(page_size() * 2, read_write, MappingFlags::PRIVATE).unwrap();
    println!("{mapping:?}");

    mapping.write_bytes(0, b"guarded").unwrap();

    mapping.protect(AccessFlags::READ).unwrap();
    match mapping.write_bytes(0, b"nope") {
        Err(Error::AccessDenied { required, granted }) => {
            println!("write refused: needs {required:?}, has {granted:?}");
        }
        other => panic!("expected the write to be refused, got {other:?}"),
    }

    // Widening again works; the pages were never released.
    mapping.protect(read_write).unwrap();
    mapping.write_bytes(0, b"GUARDED").unwrap();
    println!("{}", String::from_utf8_lossy(&mapping.read_all_bytes().unwrap()[..7]));

    // `mlock` is often capped by `RLIMIT_MEMLOCK`, so a refusal is only reported.
    match mapping.lock() {
        Ok(()) => {
            println!("locked {} bytes", mapping.size());
            mapping.unlock().unwrap();
        }
        Err(e) => println!("could not lock: {e}"),
    }

    mapping.close().unwrap();
    assert!(matches!(mapping.close(), Err(Error::UseAfterClose)));
}
