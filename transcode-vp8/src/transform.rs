//! VP8 inverse transforms (Walsh-Hadamard and DCT).
//!
//! Coefficients and the intermediate pass are kept to 16 bits, matching the
//! wraparound of conforming decoders on out-of-range input.

/// sin(pi/8) * sqrt(2), in 16.16.
const SIN_PI8_SQRT2: i32 = 35468;

/// cos(pi/8) * sqrt(2) - 1, in 16.16.
const COS_PI8_SQRT2_MINUS1: i32 = 20091;

#[inline]
fn s16(x: i32) -> i32 {
    x as i16 as i32
}

#[inline]
fn odd_part(x1: i32, x3: i32) -> (i32, i32) {
    let c = ((x1 * SIN_PI8_SQRT2) >> 16) - (x3 + ((x3 * COS_PI8_SQRT2_MINUS1) >> 16));
    let d = (x1 + ((x1 * COS_PI8_SQRT2_MINUS1) >> 16)) + ((x3 * SIN_PI8_SQRT2) >> 16);
    (c, d)
}

/// Inverse 4x4 DCT of a dequantized block in raster order.
pub fn idct4x4(input: &[i32; 16], output: &mut [i32; 16]) {
    let mut tmp = [0i32; 16];

    // Columns
    for i in 0..4 {
        let (x0, x1, x2, x3) = (
            s16(input[i]),
            s16(input[4 + i]),
            s16(input[8 + i]),
            s16(input[12 + i]),
        );
        let a = x0 + x2;
        let b = x0 - x2;
        let (c, d) = odd_part(x1, x3);

        tmp[i] = s16(a + d);
        tmp[12 + i] = s16(a - d);
        tmp[4 + i] = s16(b + c);
        tmp[8 + i] = s16(b - c);
    }

    // Rows
    for i in 0..4 {
        let row = &tmp[i * 4..i * 4 + 4];
        let a = row[0] + row[2];
        let b = row[0] - row[2];
        let (c, d) = odd_part(row[1], row[3]);

        output[i * 4] = s16((a + d + 4) >> 3);
        output[i * 4 + 3] = s16((a - d + 4) >> 3);
        output[i * 4 + 1] = s16((b + c + 4) >> 3);
        output[i * 4 + 2] = s16((b - c + 4) >> 3);
    }
}

/// Inverse Walsh-Hadamard transform of the Y2 block.
///
/// Output `i` is the DC coefficient of luma block `i`.
pub fn iwht4x4(input: &[i32; 16], output: &mut [i32; 16]) {
    let mut tmp = [0i32; 16];

    // Columns
    for i in 0..4 {
        let (x0, x1, x2, x3) = (
            s16(input[i]),
            s16(input[4 + i]),
            s16(input[8 + i]),
            s16(input[12 + i]),
        );
        let a = x0 + x3;
        let b = x1 + x2;
        let c = x1 - x2;
        let d = x0 - x3;

        tmp[i] = a + b;
        tmp[4 + i] = c + d;
        tmp[8 + i] = a - b;
        tmp[12 + i] = d - c;
    }

    // Rows
    for i in 0..4 {
        let row = &tmp[i * 4..i * 4 + 4];
        let a = row[0] + row[3];
        let b = row[1] + row[2];
        let c = row[1] - row[2];
        let d = row[0] - row[3];

        output[i * 4] = s16((a + b + 3) >> 3);
        output[i * 4 + 1] = s16((c + d + 3) >> 3);
        output[i * 4 + 2] = s16((a - b + 3) >> 3);
        output[i * 4 + 3] = s16((d - c + 3) >> 3);
    }
}

/// Add a 4x4 residual to the prediction at `offset` and clamp to [0, 255].
pub fn add_residual(residual: &[i32; 16], dst: &mut [u8], offset: usize, stride: usize) {
    for (y, res_row) in residual.chunks_exact(4).enumerate() {
        let start = offset + y * stride;
        for (px, &res) in dst[start..start + 4].iter_mut().zip(res_row) {
            *px = (*px as i32 + res).clamp(0, 255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_idct_zero_input() {
        let input = [0i32; 16];
        let mut output = [1i32; 16];
        idct4x4(&input, &mut output);
        assert!(output.iter().all(|&x| x == 0));
    }

    #[test]
    fn test_idct_dc_only() {
        for dc in [-2048, -100, -5, 3, 4, 100, 2047] {
            let mut input = [0i32; 16];
            input[0] = dc;
            let mut output = [0i32; 16];
            idct4x4(&input, &mut output);
            assert!(output.iter().all(|&x| x == (dc + 4) >> 3), "dc {}", dc);
        }
    }

    #[test]
    fn test_idct_first_horizontal_ac() {
        let mut input = [0i32; 16];
        input[1] = 100;
        let mut output = [0i32; 16];
        idct4x4(&input, &mut output);
        for row in output.chunks_exact(4) {
            assert_eq!(row, &[16, 7, -7, -16]);
        }
    }

    #[test]
    fn test_wht_dc_only() {
        let mut input = [0i32; 16];
        input[0] = 800;
        let mut output = [0i32; 16];
        iwht4x4(&input, &mut output);
        assert!(output.iter().all(|&x| x == 100));

        input[0] = -13;
        iwht4x4(&input, &mut output);
        assert!(output.iter().all(|&x| x == -2));
    }

    #[test]
    fn test_wht_first_ac() {
        let mut input = [0i32; 16];
        input[1] = 16;
        let mut output = [0i32; 16];
        iwht4x4(&input, &mut output);
        for row in output.chunks_exact(4) {
            assert_eq!(row, &[2, 2, -2, -2]);
        }
    }

    #[test]
    fn test_add_residual_clamps() {
        let mut dst = vec![250u8; 8 * 4];
        let mut res = [0i32; 16];
        res[0] = 10;
        res[5] = -300;
        res[15] = 3;
        add_residual(&res, &mut dst, 2, 8);
        assert_eq!(dst[2], 255);
        assert_eq!(dst[8 + 3], 0);
        assert_eq!(dst[24 + 5], 253);
        assert_eq!(dst[0], 250);
    }
}
