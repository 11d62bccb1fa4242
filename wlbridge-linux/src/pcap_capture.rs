//! libpcap-backed capture device.

use std::time::Duration;

use pcap::{Active, Capture, Linktype, Savefile};
use wlbridge_core::{FrameMeta, RawFrame};

use crate::capture::{CaptureDevice, CaptureError, FrameSource, Injector};
use crate::config::Settings;

pub fn open(settings: &Settings) -> Result<CaptureDevice, CaptureError> {
    if !settings.monitor {
        tracing::info!("skipping monitor mode");
    }
    if !settings.promiscuous {
        tracing::info!("skipping promiscuous mode");
    }
    let cap = match activate(settings, settings.monitor) {
        Ok(cap) => cap,
        Err(e) if settings.monitor => {
            tracing::error!(error = %e, "could not enter monitor mode, retrying without it");
            activate(settings, false)?
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(interface = %settings.interface, "pcap started");

    let link = cap.get_datalink();
    if link != Linktype::IEEE802_11_RADIOTAP {
        tracing::warn!(
            ?link,
            "capture is not delivering radiotap headers; frames will be discarded"
        );
    }

    let dump = match &settings.dump_packets {
        Some(path) => {
            tracing::info!(path = %path.display(), "writing captured frames");
            Some(cap.savefile(path)?)
        }
        None => None,
    };

    // Separate handle for transmit so injection never waits on a blocked read.
    let tx = Capture::from_device(settings.interface.as_str())?
        .immediate_mode(true)
        .open()?;

    Ok(CaptureDevice {
        source: Box::new(PcapSource { cap, dump }),
        injector: Box::new(PcapInjector { cap: tx }),
    })
}

fn activate(settings: &Settings, rfmon: bool) -> Result<Capture<Active>, pcap::Error> {
    Capture::from_device(settings.interface.as_str())?
        .rfmon(rfmon)
        .promisc(settings.promiscuous)
        .immediate_mode(true)
        .open()
}

struct PcapSource {
    cap: Capture<Active>,
    dump: Option<Savefile>,
}

impl FrameSource for PcapSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        loop {
            match self.cap.next_packet() {
                Ok(packet) => {
                    if let Some(dump) = self.dump.as_mut() {
                        dump.write(&packet);
                        if let Err(e) = dump.flush() {
                            tracing::error!(error = %e, "error while dumping packet");
                        }
                    }
                    let header = packet.header;
                    let meta = FrameMeta {
                        timestamp: Duration::new(
                            header.ts.tv_sec.max(0) as u64,
                            (header.ts.tv_usec.max(0) as u32).saturating_mul(1000),
                        ),
                        truncated: header.caplen < header.len,
                    };
                    return Ok(Some(RawFrame {
                        meta,
                        data: packet.data.to_vec(),
                    }));
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(pcap::Error::NoMorePackets) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

struct PcapInjector {
    cap: Capture<Active>,
}

impl Injector for PcapInjector {
    fn inject(&mut self, frame: &[u8]) -> Result<(), CaptureError> {
        self.cap.sendpacket(frame)?;
        Ok(())
    }
}
