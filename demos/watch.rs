use std::env;

use fdevents::{
    inotify::{EventMask, InitFlags, WatchMask},
    Inotify,
};


fn main() {
    env_logger::init();

    let mut inotify = Inotify::open(InitFlags::empty())
        .expect("Failed to initialize inotify");

    let current_dir = env::current_dir()
        .expect("Failed to determine current directory");

    inotify
        .watch(
            current_dir,
            WatchMask::MODIFY | WatchMask::CREATE | WatchMask::DELETE,
        )
        .expect("Failed to add inotify watch");

    println!("Watching current directory for activity...");

    for event in &mut inotify {
        let event = event.expect("Failed to read inotify event");
        let kind  = if event.is_dir() { "Directory" } else { "File" };

        if event.mask.contains(EventMask::CREATE) {
            println!("{} created: {:?}", kind, event.name());
        } else if event.mask.contains(EventMask::DELETE) {
            println!("{} deleted: {:?}", kind, event.name());
        } else if event.mask.contains(EventMask::MODIFY) {
            println!("{} modified: {:?}", kind, event.name());
        }
    }
}
