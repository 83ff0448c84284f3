//! Protocol-1 capability catalog: what a backend may route through the dumper.

use crate::config::DumperConfig;
use crate::dumper::handler::HandlerRegistry;
use crate::dumper::layout::{
    map_node_shape, pair_second_offset, value_shape, QObject, QSharedPointer, QWeakPointer,
    StdStringLayout,
};
use crate::dumper::memory::Target;
use crate::dumper::names::KnownType;
use crate::dumper::wire::{Reply, WireWriter};
use crate::version::DUMPER_VERSION;
use itertools::Itertools;

/// Catalog spelling of the narrow `std::basic_string`.
const STD_STRING: &str = "std::basic_string<char,std::char_traits<char>,std::allocator<char> >";
/// Catalog spelling of the wide `std::basic_string`.
const STD_WSTRING: &str = "std::basic_string<unsigned short,std::char_traits<unsigned short>,std::allocator<unsigned short> >";

/// Key and value types of the frequently used map nodes.
const MAP_NODES: [(&str, &str); 6] = [
    ("int", "int"),
    ("int", "QString"),
    ("int", "QVariant"),
    ("QString", "int"),
    ("QString", "QString"),
    ("QString", "QVariant"),
];

/// Key and value types of the frequently used `std::pair`s.
const STD_PAIRS: [(&str, &str); 10] = [
    ("int", "int"),
    ("QString", "QString"),
    ("int", "QString"),
    ("QString", "int"),
    ("std::string", "std::string"),
    ("int", "std::string"),
    ("std::string", "int"),
    ("std::wstring", "std::wstring"),
    ("int", "std::wstring"),
    ("std::wstring", "int"),
];

/// Builds the capability catalog for a configuration.
pub struct Catalog<'a> {
    config: &'a DumperConfig,
    registry: &'a HandlerRegistry,
}

impl<'a> Catalog<'a> {
    pub fn new(config: &'a DumperConfig, registry: &'a HandlerRegistry) -> Self {
        Self { config, registry }
    }

    fn target(&self) -> &Target {
        &self.config.target
    }

    /// Framework type name with the namespace prefix.
    fn ns_type(&self, name: &str) -> String {
        match self.config.namespace.trim_end_matches(':') {
            "" => name.to_string(),
            ns => format!("{ns}::{name}"),
        }
    }

    /// Name as a backend spells it: framework types are namespace qualified,
    /// standard library strings are fully expanded.
    fn spelled(&self, name: &str) -> String {
        match name {
            "std::string" => STD_STRING.to_string(),
            "std::wstring" => STD_WSTRING.to_string(),
            n if n.starts_with('Q') => self.ns_type(n),
            n => n.to_string(),
        }
    }

    /// Names of every type with a registered dumper.
    pub fn dumper_names(&self) -> Vec<String> {
        let (framework, std): (Vec<_>, Vec<_>) = self
            .registry
            .known_types()
            .filter(|k| *k != KnownType::StdVectorBool)
            .map(|k| k.name())
            .chain(["QChar", "std::basic_string"])
            .partition(|name| name.starts_with('Q'));

        framework
            .into_iter()
            .sorted()
            .map(|name| self.ns_type(name))
            .chain(std.into_iter().sorted().map(ToString::to_string))
            .collect()
    }

    /// Sizes of the types a backend can not compute itself.
    pub fn sizes(&self) -> Vec<(String, usize)> {
        let t = self.target();
        let ptr = t.pointer_size;
        let string = StdStringLayout::shape(t).0;

        let mut sizes = vec![
            ("int".to_string(), t.int_size()),
            ("char*".to_string(), ptr),
            (self.ns_type("QString"), ptr),
            (self.ns_type("QStringList"), ptr),
            (self.ns_type("QObject"), QObject::new(t).struct_size),
            ("std::string".to_string(), string),
            ("std::wstring".to_string(), string),
            ("std::allocator".to_string(), 1),
            ("std::char_traits<char>".to_string(), 1),
            ("std::char_traits<unsigned short>".to_string(), 1),
            (self.ns_type("QSharedPointer"), QSharedPointer::new(t).struct_size),
            (self.ns_type("QSharedDataPointer"), ptr),
            (self.ns_type("QWeakPointer"), QWeakPointer::new(t).struct_size),
            ("QPointer".to_string(), ptr),
        ];
        for (key, value) in MAP_NODES {
            if let Some((_, node_size)) = self.map_node(key, value) {
                let name = format!(
                    "{}<{},{}>",
                    self.ns_type("QMapNode"),
                    self.spelled(key),
                    self.spelled(value)
                );
                sizes.push((name, node_size));
            }
        }
        sizes
    }

    fn map_node(&self, key: &str, value: &str) -> Option<(usize, usize)> {
        let t = self.target();
        Some(map_node_shape(t, value_shape(key, t)?, value_shape(value, t)?))
    }

    /// Value offsets inside map nodes and pairs, as expressions a backend would evaluate.
    pub fn expressions(&self) -> Vec<(String, usize)> {
        let t = self.target();
        let closing = |name: &str| if name.ends_with('>') { " " } else { "" };

        let nodes = MAP_NODES.iter().filter_map(|(key, value)| {
            let (value_offset, _) = self.map_node(key, value)?;
            let (key, value) = (self.spelled(key), self.spelled(value));
            let name = format!(
                "(size_t)&(('{}<{key},{value}{}>'*)0)->value",
                self.ns_type("QMapNode"),
                closing(&value)
            );
            Some((name, value_offset))
        });

        let pairs = STD_PAIRS.iter().filter_map(|(key, value)| {
            let offset = pair_second_offset(t, value_shape(key, t)?, value_shape(value, t)?);
            let (key, value) = (self.spelled(key), self.spelled(value));
            let name = format!(
                "(size_t)&(('std::pair<{key} const ,{value}{}>'*)0)->second",
                closing(&value)
            );
            Some((name, offset))
        });

        nodes.chain(pairs).collect()
    }

    /// Write the catalog reply.
    pub fn render(&self) -> Reply {
        let mut out = WireWriter::new(self.config.output_buffer_size, self.config.headroom);

        out.begin_list("dumpers");
        for name in self.dumper_names() {
            out.put_list_item(name);
        }
        out.end_list();

        let v = self.config.framework_version;
        out.begin_list("qtversion");
        for part in [v.major(), v.minor(), v.patch()] {
            out.put_list_item(part);
        }
        out.end_list();

        out.put_item("dumperversion", DUMPER_VERSION);
        out.put_item("namespace", &self.config.namespace);

        out.begin_record("sizes");
        for (name, size) in self.sizes() {
            out.put_item(&name, size);
        }
        out.end_record();

        out.begin_record("expressions");
        for (name, offset) in self.expressions() {
            out.put_item(&name, offset);
        }
        out.end_record();

        out.finish()
    }
}
