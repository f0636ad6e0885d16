//! # Address Resolution
//!
//! Converts raw return addresses captured from a stack walk into
//! human-readable `{module, function, file, line}` frames. Resolution is
//! layered and strictly best-effort: every layer that fails leaves the
//! frame with whatever the previous layers produced, down to a bare raw
//! address. Nothing in this module returns an error to its callers.
//!
//! ## Resolution layers
//!
//! 1. **Dynamic loader** (`dladdr`): owning module path, module load base
//!    (giving the module-relative address) and, when the address is a
//!    named exported symbol, the raw function name. One syscall-free
//!    library call per address.
//! 2. **Symbol table** (`nm` dump): a lazily built, process-wide sorted
//!    table of the executable's link-time symbols; binary search finds the
//!    nearest symbol at or below the address. Built at most once; a missing
//!    tool degrades the table permanently instead of retrying.
//! 3. **DWARF debug info** (`addr2line`/`gimli`/`object`): in-process
//!    file/line (and function, when the first two layers had none) for
//!    frames that fall inside the main executable.
//!
//! Position-independent executables are handled by probing DWARF with the
//! module-relative address; non-relocatable binaries are probed with the
//! raw address. All file/line probes use `address - 1` so a return address
//! maps to its call site rather than the next statement.

pub mod memory_maps;
pub mod resolver;
pub mod symbol_table;
pub mod symbolizer;

pub use memory_maps::{executable_range, MemoryRange};
pub use resolver::AddressResolver;
pub use symbol_table::{SymbolEntry, SymbolTable};
pub use symbolizer::{SourceInfo, Symbolizer};
