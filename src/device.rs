export![composer, decode, display, environment, media, screen];
