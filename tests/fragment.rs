//! End-to-end fragment scenarios: build, encode, decode, resolve.

use bytes::{Bytes, BytesMut};

use fragmp4::{
    decode_box, AnyBox, CuePayloadBox, Fragment, FullSample, Mp4Box, Mp4BoxError, Sample,
    TrackExtendsBox, TrackFragmentSample, VttCueBox,
};

fn full_sample(decode_time: u64, duration: u32, flags: u32, data: &[u8]) -> FullSample {
    FullSample {
        sample: Sample {
            flags,
            duration,
            size: data.len() as u32,
            composition_time_offset: 0,
        },
        decode_time,
        data: Bytes::copy_from_slice(data),
    }
}

#[test]
fn empty_fragment_skeleton() {
    let mut frag = Fragment::create(7, 1);
    let bytes = frag.encode_to_bytes().unwrap();

    // the stream opens with the moof box
    assert_eq!(&bytes[4..8], b"moof");

    let back = Fragment::decode(&mut &bytes[..]).unwrap();
    assert_eq!(back.moof.mfhd.sequence_number, 7);

    let traf = back.moof.first_traf().unwrap();
    assert_eq!(traf.tfhd.track_id, 1);
    assert_eq!(
        traf.base_media_decode_time
            .as_ref()
            .unwrap()
            .base_media_decode_time,
        0
    );
    assert_eq!(traf.track_runs.len(), 1);
    assert_eq!(traf.track_runs[0].sample_count(), 0);
    assert!(back.mdat.data.is_empty());
}

#[test]
fn single_sample_fragment() {
    let mut frag = Fragment::create(1, 1);
    frag.add_full_sample(&full_sample(1000, 1024, 0x0200_0000, &[0xDE, 0xAD, 0xBE, 0xEF]))
        .unwrap();

    let bytes = frag.encode_to_bytes().unwrap();

    // encode_to_bytes leaves the fragment in its optimized form
    let traf = frag.moof.first_traf().unwrap();
    assert_eq!(
        traf.base_media_decode_time
            .as_ref()
            .unwrap()
            .base_media_decode_time,
        1000
    );
    assert_eq!(traf.tfhd.default_sample_flags, Some(0x0200_0000));
    assert_eq!(traf.tfhd.default_sample_size, Some(4));

    let run = &traf.track_runs[0];
    assert_eq!(run.sample_count(), 1);
    assert_eq!(run.data_offset, Some(frag.moof.size() as i32 + 8));
    assert_eq!(frag.mdat.data, [0xDE, 0xAD, 0xBE, 0xEF]);

    // and the byte stream decodes back to the same picture
    let back = Fragment::decode(&mut &bytes[..]).unwrap();
    let samples = back.get_full_samples(None).unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].decode_time, 1000);
    assert_eq!(samples[0].sample.flags, 0x0200_0000);
    assert_eq!(&samples[0].data[..], &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn resolver_precedence_over_encode_decode() {
    // per-sample durations beat the tfhd default, which beats trex
    let mut frag = Fragment::create(1, 1);
    frag.add_full_sample(&full_sample(0, 50, 0, &[1])).unwrap();
    frag.add_full_sample(&full_sample(50, 60, 0, &[2])).unwrap();

    let bytes = frag.encode_to_bytes().unwrap();
    let back = Fragment::decode(&mut &bytes[..]).unwrap();

    let trex = TrackExtendsBox {
        track_id: 1,
        default_sample_description_index: 1,
        default_sample_duration: 100,
        default_sample_size: 0,
        default_sample_flags: 0,
    };

    let samples = back.get_full_samples(Some(&trex)).unwrap();
    let durations: Vec<u32> = samples.iter().map(|s| s.sample.duration).collect();
    assert_eq!(durations, [50, 60]);
}

#[test]
fn default_base_is_moof_offsets() {
    // moof at 0, mdat payload at absolute 120, run offset 120 -> payload byte 0
    let mut frag = Fragment::create(1, 1);
    frag.mdat.add_sample_data(&[0x11, 0x22]);
    frag.mdat.start_pos = 112;

    let run = &mut frag.moof.trafs[0].track_runs[0];
    run.data_offset = Some(120);
    run.samples = vec![
        TrackFragmentSample {
            duration: Some(10),
            size: Some(1),
            flags: None,
            composition_time_offset: None,
        };
        2
    ];

    let samples = frag.get_full_samples(None).unwrap();
    assert_eq!(&samples[0].data[..], &[0x11]);
    assert_eq!(&samples[1].data[..], &[0x22]);
}

#[test]
fn multi_trun_time_accumulation() {
    let mut frag = Fragment::create(1, 1);
    frag.add_full_sample(&full_sample(500, 10, 0, &[1])).unwrap();
    frag.add_full_sample(&full_sample(510, 10, 0, &[2])).unwrap();
    frag.start_new_trun_for_track(1).unwrap();
    frag.add_full_sample(&full_sample(520, 20, 0, &[3])).unwrap();
    frag.add_full_sample(&full_sample(540, 20, 0, &[4])).unwrap();

    let bytes = frag.encode_to_bytes().unwrap();
    let back = Fragment::decode(&mut &bytes[..]).unwrap();

    let samples = back.get_full_samples(None).unwrap();

    // sample count is conserved across both runs
    let declared: u64 = back
        .moof
        .first_traf()
        .unwrap()
        .track_runs
        .iter()
        .map(|r| r.sample_count() as u64)
        .sum();
    assert_eq!(samples.len() as u64, declared);
    assert_eq!(declared, 4);

    let times: Vec<u64> = samples.iter().map(|s| s.decode_time).collect();
    assert_eq!(times, [500, 510, 520, 540]);

    // samples sit at strictly increasing, size-separated payload offsets
    let data: Vec<u8> = samples.iter().flat_map(|s| s.data.to_vec()).collect();
    assert_eq!(data, [1, 2, 3, 4]);
}

#[test]
fn multi_track_fragment_resolves_per_track() {
    let mut frag = Fragment::create_multi_track(9, &[1, 2]);

    frag.add_full_sample_to_track(&full_sample(0, 10, 0, &[0xA1, 0xA2]), 1)
        .unwrap();
    frag.add_full_sample_to_track(&full_sample(0, 10, 0, &[0xB1]), 2)
        .unwrap();

    let bytes = frag.encode_to_bytes().unwrap();
    let back = Fragment::decode(&mut &bytes[..]).unwrap();

    let trex = |track_id: u32| TrackExtendsBox {
        track_id,
        default_sample_description_index: 1,
        default_sample_duration: 0,
        default_sample_size: 0,
        default_sample_flags: 0,
    };

    let track1 = back.get_full_samples(Some(&trex(1))).unwrap();
    assert_eq!(track1.len(), 1);
    assert_eq!(&track1[0].data[..], &[0xA1, 0xA2]);

    let track2 = back.get_full_samples(Some(&trex(2))).unwrap();
    assert_eq!(track2.len(), 1);
    assert_eq!(&track2[0].data[..], &[0xB1]);

    // a track that has no traf in this fragment is not an error
    assert!(back.get_full_samples(Some(&trex(3))).unwrap().is_empty());
}

#[test]
fn encode_is_idempotent() {
    let mut frag = Fragment::create(3, 1);
    frag.add_full_sample(&full_sample(0, 10, 0x0200_0000, &[1, 2, 3]))
        .unwrap();
    frag.add_full_sample(&full_sample(10, 10, 0x0101_0000, &[4]))
        .unwrap();

    let once = frag.encode_to_bytes().unwrap();
    let twice = frag.encode_to_bytes().unwrap();
    assert_eq!(once, twice);

    // and a decoded copy re-encodes to the same bytes
    let mut back = Fragment::decode(&mut &once[..]).unwrap();
    assert_eq!(back.encode_to_bytes().unwrap(), once);
}

#[test]
fn fragment_roundtrip_preserves_foreign_boxes() {
    let mut frag = Fragment::create(2, 1);
    frag.add_full_sample(&full_sample(0, 10, 0, &[0x55])).unwrap();
    let mut bytes = frag.encode_to_bytes().unwrap().to_vec();

    // append an unrecognized top-level box
    bytes.extend_from_slice(&[0, 0, 0, 12, b'f', b'r', b'e', b'e', 1, 2, 3, 4]);

    let mut back = Fragment::decode(&mut &bytes[..]).unwrap();
    assert_eq!(back.others.len(), 1);
    assert_eq!(&back.encode_to_bytes().unwrap()[..], &bytes[..]);
}

#[test]
fn box_level_roundtrip_is_byte_exact() {
    let mut frag = Fragment::create(4, 1);
    frag.add_full_sample(&full_sample(0, 10, 0, &[9, 9])).unwrap();
    let bytes = frag.encode_to_bytes().unwrap();

    // walk the top-level boxes and re-encode each one
    let mut reader = &bytes[..];
    let mut out = BytesMut::new();
    let mut pos = 0u64;
    while let Some((parsed, consumed)) = decode_box(&mut reader, pos).unwrap() {
        assert_eq!(parsed.size(), consumed);
        parsed.write(&mut out).unwrap();
        pos += consumed;
    }

    assert_eq!(&out[..], &bytes[..]);
}

#[test]
fn missing_moof_or_mdat_is_rejected() {
    let only_mdat = [0, 0, 0, 9, b'm', b'd', b'a', b't', 0xFF];
    assert!(matches!(
        Fragment::decode(&mut &only_mdat[..]),
        Err(Mp4BoxError::MissingBox { parent: "fragment", .. })
    ));
}

#[test]
fn webvtt_cues_travel_as_sample_data() {
    // a wvtt sample is itself a box: one vttc with the cue payload
    let mut cue = VttCueBox::new();
    cue.add_child(AnyBox::Payl(CuePayloadBox {
        cue_text: "First!".into(),
    }));

    let mut cue_bytes = BytesMut::new();
    cue.write(&mut cue_bytes).unwrap();

    let mut frag = Fragment::create(1, 1);
    frag.add_full_sample(&full_sample(0, 2000, 0, &cue_bytes))
        .unwrap();

    let bytes = frag.encode_to_bytes().unwrap();
    let back = Fragment::decode(&mut &bytes[..]).unwrap();
    let samples = back.get_full_samples(None).unwrap();
    assert_eq!(samples.len(), 1);

    let (sample_box, _) = decode_box(&mut &samples[0].data[..], 0).unwrap().unwrap();
    match sample_box {
        AnyBox::Vttc(vttc) => {
            assert_eq!(vttc.payload().unwrap().cue_text, "First!");
        }
        other => panic!("unexpected box {:?}", other.fourcc()),
    }
}
