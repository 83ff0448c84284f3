//! Raw memory access to an inspected process.
//!
//! Every read is fallible: a read either returns exactly the requested bytes or an error,
//! never a partial buffer. Implementations:
//! - [`TraceeMemory`]: out-of-process access to a traced process (`process_vm_readv` with
//!   a ptrace word-by-word fallback),
//! - [`LocalMemory`]: in-process access, every read is validated against readable mappings first,
//! - `SimulatedMemory` (`sim` feature): sandboxed memory model assembled from explicit regions.

use crate::dumper::error::MemoryError;
use bytes::Bytes;
use nix::libc::{c_long, c_void};
use nix::sys;
use nix::sys::uio::{process_vm_readv, RemoteIoVec};
use nix::unistd::Pid;
use serde::Deserialize;
#[cfg(any(test, feature = "sim"))]
use std::collections::BTreeMap;
use std::io::IoSliceMut;
use std::mem;
use std::ops::Range;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Source of inspected process memory.
pub trait MemoryAccessor {
    /// Read exactly `len` bytes starting at `addr`.
    fn read(&self, addr: usize, len: usize) -> Result<Bytes, MemoryError>;

    /// Access probe, return true if `len` bytes at `addr` may be read.
    fn probe(&self, addr: usize, len: usize) -> bool {
        self.read(addr, len).is_ok()
    }
}

impl<T: MemoryAccessor + ?Sized> MemoryAccessor for &T {
    fn read(&self, addr: usize, len: usize) -> Result<Bytes, MemoryError> {
        (**self).read(addr, len)
    }

    fn probe(&self, addr: usize, len: usize) -> bool {
        (**self).probe(addr, len)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, EnumString, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[strum(serialize = "little")]
    Little,
    #[strum(serialize = "big")]
    Big,
}

impl ByteOrder {
    pub fn host() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

/// Standard library ABI of the inspected process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, EnumString, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
pub enum StdAbi {
    /// libstdc++ with the C++11 ABI (small string optimization, sized lists).
    #[strum(serialize = "gnu_cxx11")]
    GnuCxx11,
    /// libstdc++ with the old copy-on-write strings.
    #[strum(serialize = "gnu_cow")]
    GnuCow,
    /// Microsoft C++ runtime.
    #[strum(serialize = "msvc")]
    Msvc,
}

/// Inspected process architecture description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Target {
    pub pointer_size: usize,
    pub byte_order: ByteOrder,
    pub abi: StdAbi,
}

impl Target {
    pub fn host() -> Self {
        Self {
            pointer_size: mem::size_of::<usize>(),
            byte_order: ByteOrder::host(),
            abi: StdAbi::GnuCxx11,
        }
    }

    /// Size of C `int`.
    pub fn int_size(&self) -> usize {
        4
    }

    /// Size of C `long`, LLP64 for msvc, LP64 otherwise.
    pub fn long_size(&self) -> usize {
        match self.abi {
            StdAbi::Msvc => 4,
            _ => self.pointer_size,
        }
    }

    /// Size of `wchar_t`.
    pub fn wchar_size(&self) -> usize {
        match self.abi {
            StdAbi::Msvc => 2,
            _ => 4,
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::host()
    }
}

/// Return `base + delta` or error on overflow.
#[inline(always)]
pub fn offset(base: usize, delta: isize) -> Result<usize, MemoryError> {
    base.checked_add_signed(delta)
        .ok_or(MemoryError::Overflow(base))
}

/// Return `base + delta` or error on overflow.
#[inline(always)]
pub fn advance(base: usize, delta: usize) -> Result<usize, MemoryError> {
    base.checked_add(delta).ok_or(MemoryError::Overflow(base))
}

/// Typed reader over a [`MemoryAccessor`] for a concrete target.
#[derive(Clone, Copy)]
pub struct MemView<'a> {
    mem: &'a dyn MemoryAccessor,
    target: Target,
}

macro_rules! read_int {
    ($name: ident, $ty: ty, $size: literal) => {
        pub fn $name(&self, addr: usize) -> Result<$ty, MemoryError> {
            let raw = self.fixed::<$size>(addr)?;
            Ok(match self.target.byte_order {
                ByteOrder::Little => <$ty>::from_le_bytes(raw),
                ByteOrder::Big => <$ty>::from_be_bytes(raw),
            })
        }
    };
}

impl<'a> MemView<'a> {
    pub fn new(mem: &'a dyn MemoryAccessor, target: Target) -> Self {
        Self { mem, target }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn bytes(&self, addr: usize, len: usize) -> Result<Bytes, MemoryError> {
        if addr == 0 {
            return Err(MemoryError::Null);
        }
        if len == 0 {
            return Ok(Bytes::new());
        }
        let data = self.mem.read(addr, len)?;
        if data.len() != len {
            return Err(MemoryError::ShortRead {
                addr,
                len,
                read: data.len(),
            });
        }
        Ok(data)
    }

    /// Access probe for `len` bytes at `addr`.
    pub fn probe(&self, addr: usize, len: usize) -> bool {
        addr != 0 && self.mem.probe(addr, len.max(1))
    }

    /// Like [`MemView::probe`] but return an error for inaccessible memory.
    pub fn check(&self, addr: usize, len: usize) -> Result<(), MemoryError> {
        if addr == 0 {
            return Err(MemoryError::Null);
        }
        if self.probe(addr, len) {
            Ok(())
        } else {
            Err(MemoryError::Unreadable { addr, len })
        }
    }

    fn fixed<const N: usize>(&self, addr: usize) -> Result<[u8; N], MemoryError> {
        let data = self.bytes(addr, N)?;
        let mut raw = [0; N];
        raw.copy_from_slice(&data);
        Ok(raw)
    }

    read_int!(u8, u8, 1);
    read_int!(i8, i8, 1);
    read_int!(u16, u16, 2);
    read_int!(i16, i16, 2);
    read_int!(u32, u32, 4);
    read_int!(i32, i32, 4);
    read_int!(u64, u64, 8);
    read_int!(i64, i64, 8);

    pub fn f32(&self, addr: usize) -> Result<f32, MemoryError> {
        self.u32(addr).map(f32::from_bits)
    }

    pub fn f64(&self, addr: usize) -> Result<f64, MemoryError> {
        self.u64(addr).map(f64::from_bits)
    }

    /// Read unsigned integer of 1, 2, 4 or 8 bytes width.
    pub fn unsigned(&self, addr: usize, size: usize) -> Result<u64, MemoryError> {
        Ok(match size {
            1 => self.u8(addr)? as u64,
            2 => self.u16(addr)? as u64,
            4 => self.u32(addr)? as u64,
            _ => self.u64(addr)?,
        })
    }

    /// Read signed integer of 1, 2, 4 or 8 bytes width.
    pub fn signed(&self, addr: usize, size: usize) -> Result<i64, MemoryError> {
        Ok(match size {
            1 => self.i8(addr)? as i64,
            2 => self.i16(addr)? as i64,
            4 => self.i32(addr)? as i64,
            _ => self.i64(addr)?,
        })
    }

    /// Read a target pointer.
    pub fn ptr(&self, addr: usize) -> Result<usize, MemoryError> {
        Ok(self.unsigned(addr, self.target.pointer_size)? as usize)
    }

    /// Read a target pointer located at `base + delta`.
    pub fn deref_at(&self, base: usize, delta: usize) -> Result<usize, MemoryError> {
        self.ptr(advance(base, delta)?)
    }
}

/// Out-of-process memory of a traced process.
pub struct TraceeMemory {
    pid: Pid,
}

impl TraceeMemory {
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }
}

impl MemoryAccessor for TraceeMemory {
    fn read(&self, addr: usize, len: usize) -> Result<Bytes, MemoryError> {
        let mut buf = vec![0; len];
        let remote = [RemoteIoVec { base: addr, len }];
        if let Ok(read) = process_vm_readv(self.pid, &mut [IoSliceMut::new(&mut buf)], &remote) {
            if read == len {
                return Ok(Bytes::from(buf));
            }
        }

        read_memory_by_pid(self.pid, addr, len)
            .map(Bytes::from)
            .map_err(|source| MemoryError::Ptrace { addr, source })
    }
}

/// Read N bytes from `PID` process memory with ptrace, word by word.
pub fn read_memory_by_pid(pid: Pid, addr: usize, read_n: usize) -> nix::Result<Vec<u8>> {
    let mut read_reminder = read_n as isize;
    let mut result = Vec::with_capacity(read_n);

    let single_read_size = mem::size_of::<c_long>();

    let mut addr = addr;
    while read_reminder > 0 {
        let value = sys::ptrace::read(pid, addr as *mut c_void)?;
        result.extend(value.to_ne_bytes().into_iter().take(read_reminder as usize));

        read_reminder -= single_read_size as isize;
        addr = addr.wrapping_add(single_read_size);
    }

    debug_assert!(result.len() == read_n);

    Ok(result)
}

/// Memory of the current process. Reads are validated against a snapshot of readable
/// mappings, a mapping change after [`LocalMemory::snapshot`] requires [`LocalMemory::refresh`].
pub struct LocalMemory {
    readable: Vec<Range<usize>>,
}

impl LocalMemory {
    pub fn snapshot() -> Result<Self, MemoryError> {
        let mut mem = Self { readable: vec![] };
        mem.refresh()?;
        Ok(mem)
    }

    pub fn refresh(&mut self) -> Result<(), MemoryError> {
        let maps = proc_maps::get_process_maps(std::process::id() as proc_maps::Pid)?;
        self.readable = maps
            .iter()
            .filter(|m| m.is_read())
            .map(|m| m.start()..m.start() + m.size())
            .collect();
        Ok(())
    }

    fn is_readable(&self, addr: usize, len: usize) -> bool {
        let Some(end) = addr.checked_add(len) else {
            return false;
        };
        self.readable
            .iter()
            .any(|region| region.start <= addr && end <= region.end)
    }
}

impl MemoryAccessor for LocalMemory {
    fn read(&self, addr: usize, len: usize) -> Result<Bytes, MemoryError> {
        if !self.is_readable(addr, len) {
            return Err(MemoryError::Unreadable { addr, len });
        }
        // SAFETY: the range lies inside a readable mapping of this process.
        let data = unsafe { std::slice::from_raw_parts(addr as *const u8, len) };
        Ok(Bytes::copy_from_slice(data))
    }

    fn probe(&self, addr: usize, len: usize) -> bool {
        self.is_readable(addr, len)
    }
}

#[cfg(any(test, feature = "sim"))]
/// Sandboxed memory made of non-overlapping regions.
#[derive(Default, Clone, Debug)]
pub struct SimulatedMemory {
    regions: BTreeMap<usize, Vec<u8>>,
}

#[cfg(any(test, feature = "sim"))]
impl SimulatedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a region at `addr`.
    pub fn map(&mut self, addr: usize, data: impl Into<Vec<u8>>) -> &mut Self {
        self.regions.insert(addr, data.into());
        self
    }

    /// Remove region started at `addr`.
    pub fn unmap(&mut self, addr: usize) -> &mut Self {
        self.regions.remove(&addr);
        self
    }

    /// Overwrite bytes of already mapped memory.
    pub fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), MemoryError> {
        let (start, region) = self
            .regions
            .range_mut(..=addr)
            .next_back()
            .ok_or(MemoryError::Unreadable {
                addr,
                len: data.len(),
            })?;
        let from = addr - start;
        let to = from + data.len();
        if to > region.len() {
            return Err(MemoryError::Unreadable {
                addr,
                len: data.len(),
            });
        }
        region[from..to].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(any(test, feature = "sim"))]
impl MemoryAccessor for SimulatedMemory {
    fn read(&self, addr: usize, len: usize) -> Result<Bytes, MemoryError> {
        let unreadable = MemoryError::Unreadable { addr, len };
        let Some((start, region)) = self.regions.range(..=addr).next_back() else {
            return Err(unreadable);
        };
        let from = addr - start;
        let Some(to) = from.checked_add(len) else {
            return Err(unreadable);
        };
        if to > region.len() {
            return Err(unreadable);
        }
        Ok(Bytes::copy_from_slice(&region[from..to]))
    }
}

#[cfg(any(test, feature = "sim"))]
/// Bump allocator over [`SimulatedMemory`], lays out target values the way
/// the inspected process would.
pub struct SimHeap {
    target: Target,
    next: usize,
    memory: SimulatedMemory,
}

#[cfg(any(test, feature = "sim"))]
impl SimHeap {
    const BASE: usize = 0x1_0000;
    const GAP: usize = 0x100;

    pub fn new(target: Target) -> Self {
        Self {
            target,
            next: Self::BASE,
            memory: SimulatedMemory::new(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Allocate zeroed region of `size` bytes and return its address. Regions never touch,
    /// a read past the end of one region always fails.
    pub fn alloc(&mut self, size: usize) -> usize {
        let addr = self.next;
        self.memory.map(addr, vec![0; size.max(1)]);
        self.next = (addr + size.max(1) + Self::GAP + 0xF) & !0xF;
        addr
    }

    /// Allocate region initialized with `data`.
    pub fn alloc_bytes(&mut self, data: &[u8]) -> usize {
        let addr = self.alloc(data.len());
        self.put_bytes(addr, data);
        addr
    }

    /// Return an address that is guaranteed unmapped.
    pub fn dangling(&self) -> usize {
        self.next + 0x10_0000
    }

    pub fn put_bytes(&mut self, addr: usize, data: &[u8]) {
        self.memory
            .write(addr, data)
            .expect("write into allocated region");
    }

    fn encode(&self, value: u64, size: usize) -> Vec<u8> {
        match self.target.byte_order {
            ByteOrder::Little => value.to_le_bytes()[..size].to_vec(),
            ByteOrder::Big => value.to_be_bytes()[8 - size..].to_vec(),
        }
    }

    pub fn put_uint(&mut self, addr: usize, value: u64, size: usize) {
        let data = self.encode(value, size);
        self.put_bytes(addr, &data);
    }

    pub fn put_ptr(&mut self, addr: usize, value: usize) {
        self.put_uint(addr, value as u64, self.target.pointer_size);
    }

    pub fn put_i32(&mut self, addr: usize, value: i32) {
        self.put_uint(addr, value as u32 as u64, 4);
    }

    pub fn put_u16(&mut self, addr: usize, value: u16) {
        self.put_uint(addr, value as u64, 2);
    }

    pub fn put_f64(&mut self, addr: usize, value: f64) {
        self.put_uint(addr, value.to_bits(), 8);
    }

    pub fn memory(&self) -> &SimulatedMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut SimulatedMemory {
        &mut self.memory
    }

    pub fn into_memory(self) -> SimulatedMemory {
        self.memory
    }
}
