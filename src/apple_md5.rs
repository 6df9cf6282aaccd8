// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The modified MD5 used by iTunes 4.5+ request validation.
//!
//! iTunes does not hash validation input with RFC 1321 MD5: a single additive
//! constant in the second round differs (`0x445a14ed` where the RFC has
//! `0x455a14ed`). The deviation was recovered by libopendaap
//! (<http://crazney.net/programs/itunes/authentication.html>) and has to be
//! reproduced exactly — a server rejects requests hashed with stock MD5 with
//! HTTP 403. No digest crate can express the altered constant, so the whole
//! transform is written out here in the reference layout.
//!
//! Only [`hash_v3`](crate::hasher::hash_v3) and the v3 seed table use this
//! hash; everything v2 uses the real MD5 from the `md-5` crate.

/// Incremental MD5 with the iTunes round-2 deviation.
///
/// Same driving API as any digest: [`update`](Self::update) any number of
/// times, then [`finalize`](Self::finalize).
pub(crate) struct AppleMd5 {
    state: [u32; 4],
    /// Total message length in bytes, modulo 2^64.
    len: u64,
    buf: [u8; 64],
    buf_len: usize,
}

impl AppleMd5 {
    pub(crate) fn new() -> Self {
        Self {
            state: [0x6745_2301, 0xefcd_ab89, 0x98ba_dcfe, 0x1032_5476],
            len: 0,
            buf: [0u8; 64],
            buf_len: 0,
        }
    }

    pub(crate) fn update(&mut self, data: impl AsRef<[u8]>) {
        let mut data = data.as_ref();
        self.len = self.len.wrapping_add(data.len() as u64);

        // Top up a partially filled block first.
        if self.buf_len > 0 {
            let take = (64 - self.buf_len).min(data.len());
            self.buf[self.buf_len..self.buf_len + take].copy_from_slice(&data[..take]);
            self.buf_len += take;
            data = &data[take..];
            if self.buf_len == 64 {
                let block = self.buf;
                self.transform(&block);
                self.buf_len = 0;
            }
        }

        let mut chunks = data.chunks_exact(64);
        for block in &mut chunks {
            let block: &[u8; 64] = block.try_into().expect("exact chunk");
            self.transform(block);
        }

        let rest = chunks.remainder();
        self.buf[..rest.len()].copy_from_slice(rest);
        self.buf_len = rest.len();
    }

    pub(crate) fn finalize(mut self) -> [u8; 16] {
        let bit_len = self.len.wrapping_mul(8);

        // One 0x80 byte, zero padding to 56 mod 64, then the bit length LE.
        self.update([0x80u8]);
        while self.buf_len != 56 {
            self.update([0u8]);
        }
        self.update(bit_len.to_le_bytes());

        let mut out = [0u8; 16];
        for (chunk, word) in out.chunks_exact_mut(4).zip(self.state) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    fn transform(&mut self, block: &[u8; 64]) {
        #[inline(always)]
        fn f1(x: u32, y: u32, z: u32) -> u32 {
            z ^ (x & (y ^ z))
        }
        #[inline(always)]
        fn f2(x: u32, y: u32, z: u32) -> u32 {
            f1(z, x, y)
        }
        #[inline(always)]
        fn f3(x: u32, y: u32, z: u32) -> u32 {
            x ^ y ^ z
        }
        #[inline(always)]
        fn f4(x: u32, y: u32, z: u32) -> u32 {
            y ^ (x | !z)
        }
        #[inline(always)]
        fn step(f: fn(u32, u32, u32) -> u32, w: u32, x: u32, y: u32, z: u32, m: u32, s: u32) -> u32 {
            w.wrapping_add(f(x, y, z))
                .wrapping_add(m)
                .rotate_left(s)
                .wrapping_add(x)
        }

        let mut m = [0u32; 16];
        for (word, chunk) in m.iter_mut().zip(block.chunks_exact(4)) {
            *word = u32::from_le_bytes(chunk.try_into().expect("4-byte chunk"));
        }

        let [mut a, mut b, mut c, mut d] = self.state;

        a = step(f1, a, b, c, d, m[0].wrapping_add(0xd76a_a478), 7);
        d = step(f1, d, a, b, c, m[1].wrapping_add(0xe8c7_b756), 12);
        c = step(f1, c, d, a, b, m[2].wrapping_add(0x2420_70db), 17);
        b = step(f1, b, c, d, a, m[3].wrapping_add(0xc1bd_ceee), 22);
        a = step(f1, a, b, c, d, m[4].wrapping_add(0xf57c_0faf), 7);
        d = step(f1, d, a, b, c, m[5].wrapping_add(0x4787_c62a), 12);
        c = step(f1, c, d, a, b, m[6].wrapping_add(0xa830_4613), 17);
        b = step(f1, b, c, d, a, m[7].wrapping_add(0xfd46_9501), 22);
        a = step(f1, a, b, c, d, m[8].wrapping_add(0x6980_98d8), 7);
        d = step(f1, d, a, b, c, m[9].wrapping_add(0x8b44_f7af), 12);
        c = step(f1, c, d, a, b, m[10].wrapping_add(0xffff_5bb1), 17);
        b = step(f1, b, c, d, a, m[11].wrapping_add(0x895c_d7be), 22);
        a = step(f1, a, b, c, d, m[12].wrapping_add(0x6b90_1122), 7);
        d = step(f1, d, a, b, c, m[13].wrapping_add(0xfd98_7193), 12);
        c = step(f1, c, d, a, b, m[14].wrapping_add(0xa679_438e), 17);
        b = step(f1, b, c, d, a, m[15].wrapping_add(0x49b4_0821), 22);

        a = step(f2, a, b, c, d, m[1].wrapping_add(0xf61e_2562), 5);
        d = step(f2, d, a, b, c, m[6].wrapping_add(0xc040_b340), 9);
        c = step(f2, c, d, a, b, m[11].wrapping_add(0x265e_5a51), 14);
        b = step(f2, b, c, d, a, m[0].wrapping_add(0xe9b6_c7aa), 20);
        a = step(f2, a, b, c, d, m[5].wrapping_add(0xd62f_105d), 5);
        d = step(f2, d, a, b, c, m[10].wrapping_add(0x0244_1453), 9);
        c = step(f2, c, d, a, b, m[15].wrapping_add(0xd8a1_e681), 14);
        b = step(f2, b, c, d, a, m[4].wrapping_add(0xe7d3_fbc8), 20);
        a = step(f2, a, b, c, d, m[9].wrapping_add(0x21e1_cde6), 5);
        d = step(f2, d, a, b, c, m[14].wrapping_add(0xc337_07d6), 9);
        c = step(f2, c, d, a, b, m[3].wrapping_add(0xf4d5_0d87), 14);
        // RFC 1321 adds 0x455a14ed here; iTunes servers require 0x445a14ed.
        b = step(f2, b, c, d, a, m[8].wrapping_add(0x445a_14ed), 20);
        a = step(f2, a, b, c, d, m[13].wrapping_add(0xa9e3_e905), 5);
        d = step(f2, d, a, b, c, m[2].wrapping_add(0xfcef_a3f8), 9);
        c = step(f2, c, d, a, b, m[7].wrapping_add(0x676f_02d9), 14);
        b = step(f2, b, c, d, a, m[12].wrapping_add(0x8d2a_4c8a), 20);

        a = step(f3, a, b, c, d, m[5].wrapping_add(0xfffa_3942), 4);
        d = step(f3, d, a, b, c, m[8].wrapping_add(0x8771_f681), 11);
        c = step(f3, c, d, a, b, m[11].wrapping_add(0x6d9d_6122), 16);
        b = step(f3, b, c, d, a, m[14].wrapping_add(0xfde5_380c), 23);
        a = step(f3, a, b, c, d, m[1].wrapping_add(0xa4be_ea44), 4);
        d = step(f3, d, a, b, c, m[4].wrapping_add(0x4bde_cfa9), 11);
        c = step(f3, c, d, a, b, m[7].wrapping_add(0xf6bb_4b60), 16);
        b = step(f3, b, c, d, a, m[10].wrapping_add(0xbebf_bc70), 23);
        a = step(f3, a, b, c, d, m[13].wrapping_add(0x289b_7ec6), 4);
        d = step(f3, d, a, b, c, m[0].wrapping_add(0xeaa1_27fa), 11);
        c = step(f3, c, d, a, b, m[3].wrapping_add(0xd4ef_3085), 16);
        b = step(f3, b, c, d, a, m[6].wrapping_add(0x0488_1d05), 23);
        a = step(f3, a, b, c, d, m[9].wrapping_add(0xd9d4_d039), 4);
        d = step(f3, d, a, b, c, m[12].wrapping_add(0xe6db_99e5), 11);
        c = step(f3, c, d, a, b, m[15].wrapping_add(0x1fa2_7cf8), 16);
        b = step(f3, b, c, d, a, m[2].wrapping_add(0xc4ac_5665), 23);

        a = step(f4, a, b, c, d, m[0].wrapping_add(0xf429_2244), 6);
        d = step(f4, d, a, b, c, m[7].wrapping_add(0x432a_ff97), 10);
        c = step(f4, c, d, a, b, m[14].wrapping_add(0xab94_23a7), 15);
        b = step(f4, b, c, d, a, m[5].wrapping_add(0xfc93_a039), 21);
        a = step(f4, a, b, c, d, m[12].wrapping_add(0x655b_59c3), 6);
        d = step(f4, d, a, b, c, m[3].wrapping_add(0x8f0c_cc92), 10);
        c = step(f4, c, d, a, b, m[10].wrapping_add(0xffef_f47d), 15);
        b = step(f4, b, c, d, a, m[1].wrapping_add(0x8584_5dd1), 21);
        a = step(f4, a, b, c, d, m[8].wrapping_add(0x6fa8_7e4f), 6);
        d = step(f4, d, a, b, c, m[15].wrapping_add(0xfe2c_e6e0), 10);
        c = step(f4, c, d, a, b, m[6].wrapping_add(0xa301_4314), 15);
        b = step(f4, b, c, d, a, m[13].wrapping_add(0x4e08_11a1), 21);
        a = step(f4, a, b, c, d, m[4].wrapping_add(0xf753_7e82), 6);
        d = step(f4, d, a, b, c, m[11].wrapping_add(0xbd3a_f235), 10);
        c = step(f4, c, d, a, b, m[2].wrapping_add(0x2ad7_d2bb), 15);
        b = step(f4, b, c, d, a, m[9].wrapping_add(0xeb86_d391), 21);

        self.state[0] = self.state[0].wrapping_add(a);
        self.state[1] = self.state[1].wrapping_add(b);
        self.state[2] = self.state[2].wrapping_add(c);
        self.state[3] = self.state[3].wrapping_add(d);
    }
}
