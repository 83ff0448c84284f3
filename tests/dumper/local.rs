//! Dumps of values living in the test process itself.

use qdumper::config::DumperConfig;
use qdumper::dumper::memory::{LocalMemory, Target};
use qdumper::dumper::request::InspectionRequest;
use qdumper::dumper::Dumper;

/// `QByteArray::Data` as laid out by the host compiler.
#[repr(C)]
#[allow(dead_code)]
struct ByteArrayData {
    refcount: i32,
    alloc: i32,
    size: i32,
    data: *const u8,
}

#[test]
fn test_local_byte_array() {
    let chars = b"hi\0".to_vec();
    let data = Box::new(ByteArrayData {
        refcount: 1,
        alloc: 2,
        size: 2,
        data: chars.as_ptr(),
    });
    let holder: Box<*const ByteArrayData> = Box::new(&*data);
    let addr = &*holder as *const *const ByteArrayData as usize;

    let mem = LocalMemory::snapshot().unwrap();
    let dumper = Dumper::new(DumperConfig::default().with_target(Target::host()));
    let reply = dumper.dump(
        &InspectionRequest::new("QByteArray", "local.ba").with_address(addr),
        &mem,
    );
    assert!(reply
        .payload
        .ends_with(r#"value="aGk=",valueencoded="1",numchild="2""#));
    assert_eq!(data.refcount, 1);
}

#[test]
fn test_local_scalar_and_unmapped_pointer() {
    let value = Box::new(-7i64);
    let addr = &*value as *const i64 as usize;

    let mem = LocalMemory::snapshot().unwrap();
    let dumper = Dumper::new(DumperConfig::default().with_target(Target::host()));
    let reply = dumper.dump(
        &InspectionRequest::new("long long", "local.v").with_address(addr),
        &mem,
    );
    assert!(reply.payload.ends_with(r#"value="-7",numchild="0""#));

    // the zero page is never mapped
    let reply = dumper.dump(
        &InspectionRequest::new("long long", "local.v").with_address(0x10),
        &mem,
    );
    assert!(reply
        .payload
        .ends_with(r#"value="<internal error>",numchild="0""#));
}
