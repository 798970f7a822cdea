use std::{
    fs::File,
    io,
    thread,
    time::Duration,
};

use futures::StreamExt;
use fdevents::{
    inotify::{InitFlags, WatchMask},
    Inotify,
};
use tempdir::TempDir;


#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), io::Error> {
    env_logger::init();

    let mut inotify = Inotify::open(InitFlags::empty())?;

    let dir = TempDir::new("fdevents-demo")?;

    inotify.watch(dir.path(), WatchMask::CREATE | WatchMask::MODIFY)?;

    thread::spawn::<_, Result<(), io::Error>>(move || {
        loop {
            File::create(dir.path().join("file"))?;
            thread::sleep(Duration::from_millis(500));
        }
    });

    let mut stream = inotify.into_stream()?;

    while let Some(event) = stream.next().await {
        println!("event: {:?}", event?);
    }

    Ok(())
}
