use std::path::Path;

pub fn print_universe_banner(dir: &Path, snapshot: &str, vm_count: usize) {
    if is_interactive_terminal() {
        let from = if snapshot.is_empty() {
            String::new()
        } else {
            format!(" from snapshot \x1b[1m{snapshot}\x1b[0m")
        };
        eprintln!(
            "\x1b[1;36m[vkube]\x1b[0m universe \x1b[1m{}\x1b[0m up{from} ({vm_count} vms)",
            dir.display()
        );
    }
}

pub fn print_universe_exit(dir: &Path, saved_as: Option<&str>) {
    if is_interactive_terminal() {
        match saved_as {
            Some(name) => eprintln!(
                "\x1b[1;36m[vkube]\x1b[0m universe {} saved as {name}",
                dir.display()
            ),
            None => eprintln!("\x1b[1;36m[vkube]\x1b[0m universe {} closed", dir.display()),
        }
    }
}

#[allow(unsafe_code)]
fn is_interactive_terminal() -> bool {
    // SAFETY: isatty() only inspects the descriptor and has no side effects.
    unsafe { libc::isatty(libc::STDERR_FILENO) != 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banners_dont_panic() {
        print_universe_banner(Path::new("/tmp/u"), "base", 2);
        print_universe_banner(Path::new("/tmp/u"), "", 0);
        print_universe_exit(Path::new("/tmp/u"), Some("base"));
        print_universe_exit(Path::new("/tmp/u"), None);
    }
}
