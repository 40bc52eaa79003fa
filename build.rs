use std::path::PathBuf;

/// Turns the `kernel` artifact dependency into bootable UEFI/BIOS disk
/// images and exposes their paths to `src/main.rs` via `env!`.
fn main() {
    let kernel_bin = PathBuf::from(std::env::var_os("CARGO_BIN_FILE_KERNEL_kernel").unwrap());
    let out_dir = PathBuf::from(std::env::var_os("OUT_DIR").unwrap());

    let uefi_path = out_dir.join("pager-uefi.img");
    bootloader::UefiBoot::new(&kernel_bin)
        .create_disk_image(&uefi_path)
        .expect("failed to create UEFI disk image");

    let bios_path = out_dir.join("pager-bios.img");
    bootloader::BiosBoot::new(&kernel_bin)
        .create_disk_image(&bios_path)
        .expect("failed to create BIOS disk image");

    println!("cargo:rustc-env=UEFI_PATH={}", uefi_path.display());
    println!("cargo:rustc-env=BIOS_PATH={}", bios_path.display());

    let ovmf = ovmf_prebuilt::Prebuilt::fetch(ovmf_prebuilt::Source::LATEST, out_dir.join("ovmf"))
        .expect("failed to fetch prebuilt OVMF firmware");
    println!("cargo:rustc-env=OVMF_CODE={}", ovmf.get_file(ovmf_prebuilt::Arch::X64, ovmf_prebuilt::FileType::Code).display());
    println!("cargo:rustc-env=OVMF_VARS={}", ovmf.get_file(ovmf_prebuilt::Arch::X64, ovmf_prebuilt::FileType::Vars).display());
}
