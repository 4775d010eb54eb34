fn main() {
    std::process::exit(uninstall_without_root_lib::run());
}
