use crate::common::{assert_well_formed, dump, target32};
use qdumper::dumper::memory::{ByteOrder, SimHeap, StdAbi, Target};
use qdumper::dumper::request::InspectionRequest;

const ABIS: [StdAbi; 3] = [StdAbi::GnuCxx11, StdAbi::GnuCow, StdAbi::Msvc];

#[test]
fn test_std_string_32bit() {
    for abi in ABIS {
        let mut heap = SimHeap::new(target32(abi));
        let addr = heap.std_string(b"hi");
        let reply = dump(
            heap,
            InspectionRequest::new(
                "std::basic_string<char, std::char_traits<char>, std::allocator<char> >",
                "local.s",
            )
            .with_address(addr),
        );
        assert!(
            reply
                .payload
                .ends_with(r#"value="aGk=",valueencoded="1",numchild="0""#),
            "{abi:?}: {}",
            reply.payload
        );
    }
}

#[test]
fn test_std_vector_32bit() {
    for abi in ABIS {
        let mut heap = SimHeap::new(target32(abi));
        let addr = heap.std_vector_of_ints(&[10, 20]);
        let reply = dump(
            heap,
            InspectionRequest::new("std::vector<int>", "local.v")
                .with_address(addr)
                .with_hints([4, 0, 0, 0])
                .with_children(true),
        );
        let out = reply.payload;
        assert!(out.contains(r#"numchild="2""#), "{abi:?}: {out}");
        assert!(out.contains(r#"value="20""#), "{abi:?}: {out}");
        assert_well_formed(&out);
    }
}

#[test]
fn test_std_set_32bit() {
    for abi in ABIS {
        let mut heap = SimHeap::new(target32(abi));
        let addr = heap.std_set_of_ints(&[3, 1, 2]);
        let reply = dump(
            heap,
            InspectionRequest::new("std::set<int>", "local.s")
                .with_address(addr)
                .with_children(true),
        );
        let out = reply.payload;
        assert!(out.contains(r#"value="<3 items>""#), "{abi:?}: {out}");
        assert_well_formed(&out);
    }
}

#[test]
fn test_std_list_without_children() {
    for abi in ABIS {
        let mut heap = SimHeap::new(target32(abi));
        let addr = heap.std_list_of_ints(&[1, 2, 3, 4]);
        let reply = dump(
            heap,
            InspectionRequest::new("std::list<int>", "local.l").with_address(addr),
        );
        assert!(
            reply
                .payload
                .ends_with(r#"value="<4 items>",numchild="4",valuedisabled="true""#),
            "{abi:?}: {}",
            reply.payload
        );
    }
}

fn target64() -> Target {
    Target {
        pointer_size: 8,
        byte_order: ByteOrder::Little,
        abi: StdAbi::GnuCxx11,
    }
}

#[test]
fn test_std_vector_reversed_pointers() {
    // start, finish, end_of_storage
    let cases = [
        (0x8000_0000_0000_1000, 0x7fff_ffff_ffff_f000, 0x7fff_ffff_ffff_f000),
        (0x2000, 0x1000, 0x3000),
        (0x1000, 0x2000, 0x1800),
    ];
    for (start, finish, end_of_storage) in cases {
        let mut heap = SimHeap::new(target64());
        let addr = heap.alloc(24);
        heap.put_ptr(addr, start);
        heap.put_ptr(addr + 8, finish);
        heap.put_ptr(addr + 16, end_of_storage);

        let reply = dump(
            heap,
            InspectionRequest::new("std::vector<int>", "local.v")
                .with_address(addr)
                .with_inner("int")
                .with_hints([4, 0, 0, 0])
                .with_children(true),
        );
        let out = reply.payload;
        assert!(
            out.ends_with(r#"type="std::vector<int>",value="<internal error>",numchild="0""#),
            "{start:#x}..{finish:#x}: {out}"
        );
        assert_well_formed(&out);
    }
}

#[test]
fn test_std_vector_bool_huge_span() {
    // start, finish
    let cases = [(0x1000, 0x7fff_ffff_ffff_f000), (0x2000, 0x1000)];
    for (start, finish) in cases {
        let mut heap = SimHeap::new(target64());
        let addr = heap.alloc(40);
        heap.put_ptr(addr, start);
        heap.put_ptr(addr + 16, finish);
        heap.put_i32(addr + 24, 3);
        heap.put_ptr(addr + 32, finish);

        let reply = dump(
            heap,
            InspectionRequest::new("std::vector<bool>", "local.v")
                .with_address(addr)
                .with_children(true),
        );
        let out = reply.payload;
        assert!(
            out.ends_with(r#"type="std::vector<bool>",value="<internal error>",numchild="0""#),
            "{start:#x}..{finish:#x}: {out}"
        );
        assert_well_formed(&out);
    }
}
