use qdumper::config::DumperConfig;
use qdumper::dumper::memory::{SimHeap, Target};
use qdumper::dumper::request::InspectionRequest;
use qdumper::dumper::wire::Reply;
use qdumper::dumper::Dumper;

/// Run a single request against a heap with a default configuration.
pub fn dump(heap: SimHeap, request: InspectionRequest) -> Reply {
    let config = DumperConfig::default().with_target(*heap.target());
    dump_with(config, heap, request)
}

pub fn dump_with(config: DumperConfig, heap: SimHeap, request: InspectionRequest) -> Reply {
    let mem = heap.into_memory();
    Dumper::new(config).dump(&request, &mem)
}

/// 32 bit target with the given standard library.
pub fn target32(abi: qdumper::dumper::memory::StdAbi) -> Target {
    Target {
        pointer_size: 4,
        abi,
        ..Target::default()
    }
}

/// Check delimiter balance, quote pairing and comma placement of a wire text.
pub fn assert_well_formed(text: &str) {
    let mut depth: Vec<char> = vec![];
    let mut in_quote = false;
    let mut prev = ' ';
    for c in text.chars() {
        if in_quote {
            if c == '"' {
                in_quote = false;
            }
            prev = c;
            continue;
        }
        match c {
            '"' => in_quote = true,
            '{' => depth.push('}'),
            '[' => depth.push(']'),
            '}' | ']' => {
                assert_eq!(depth.pop(), Some(c), "unbalanced `{c}` in {text}");
                assert_ne!(prev, ',', "comma before closer in {text}");
            }
            ',' => assert_ne!(prev, ',', "double comma in {text}"),
            _ => {}
        }
        prev = c;
    }
    assert!(!in_quote, "unterminated quote in {text}");
    assert!(depth.is_empty(), "unclosed scope in {text}");
}
