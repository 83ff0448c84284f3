fn main() {
    if !cfg!(target_os = "linux") {
        panic!(
            "{} only works with linux (ptrace and procfs are required)",
            env!("CARGO_PKG_NAME")
        );
    }
}
