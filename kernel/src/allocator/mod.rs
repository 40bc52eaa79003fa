// kernel/src/allocator/mod.rs
//
// The kernel's own heap (backs `alloc::vec::Vec`/`String` used inside
// the kernel itself, e.g. `vma::vmas_of`'s snapshot). Distinct from
// the per-process, demand-paged heap (C6) and the user-space `malloc`
// implementation (C7) — this one is a fixed-size bump allocator over a
// static array, good enough for the small, short-lived kernel
// allocations this codebase makes.

pub mod bump;
